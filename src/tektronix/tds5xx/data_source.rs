use super::TekTds5xx;
use crate::error::InstrumentError;
use crate::types::{Mnemonic, Source, Waveform, WaveformEncoding};
use log::{debug, warn};
use ndarray::Array1;

/// A trace that waveform data can be read from: a math trace or a reference
/// memory. Input channels use [`super::Tds5xxChannel`], which reads the same
/// way.
pub struct Tds5xxDataSource<'a> {
    scope: &'a mut TekTds5xx,
    source: Source,
}

impl<'a> Tds5xxDataSource<'a> {
    pub(super) fn new(scope: &'a mut TekTds5xx, source: Source) -> Self {
        Self { scope, source }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.source.mnemonic()
    }

    pub fn read_waveform(
        &mut self,
        encoding: WaveformEncoding,
    ) -> Result<Waveform, InstrumentError> {
        self.scope.read_waveform(self.source, encoding)
    }
}

impl TekTds5xx {
    /// Run `f` with `source` selected as the data source.
    ///
    /// The previous source is restored afterwards, whether or not `f`
    /// succeeded. Nothing is sent when `source` is already selected.
    pub fn with_data_source<R>(
        &mut self,
        source: Source,
        f: impl FnOnce(&mut Self) -> Result<R, InstrumentError>,
    ) -> Result<R, InstrumentError> {
        let previous = self.data_source()?;
        if previous == source {
            return f(self);
        }

        self.set_data_source(source)?;
        let result = f(self);
        let restored = self.set_data_source(previous);

        match (result, restored) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(restore_err)) => {
                warn!("Failed to restore data source {previous}: {restore_err}");
                Err(e)
            }
        }
    }

    /// Transfer the waveform of `source` and scale it to physical units.
    ///
    /// Binary transfers of 2500 two-byte points take about two seconds over
    /// GPIB, ASCII transfers roughly four times as long.
    pub fn read_waveform(
        &mut self,
        source: Source,
        encoding: WaveformEncoding,
    ) -> Result<Waveform, InstrumentError> {
        self.with_data_source(source, |tek| tek.transfer_waveform(source, encoding))
    }

    fn transfer_waveform(
        &mut self,
        source: Source,
        encoding: WaveformEncoding,
    ) -> Result<Waveform, InstrumentError> {
        let raw = match encoding {
            WaveformEncoding::Ascii => {
                self.sendcmd("DAT:ENC ASCI")?;
                let reply = self.query("CURVE?")?;
                parse_ascii_curve(&reply)?
            }
            WaveformEncoding::Binary => {
                self.sendcmd("DAT:ENC RIB")?;
                let width = self.data_width()?;
                self.sendcmd("CURVE?")?;
                let points = self.inst.binblockread(width)?;
                // drop the terminator that follows the block
                self.inst.flush_input()?;
                points.into_iter().map(|p| p as f64).collect()
            }
        };
        debug!("Read {} points from {source}", raw.len());

        let yoffset = self.inst.query_f64(&format!("WFMP:{source}:YOF?"))?;
        let ymult = self.inst.query_f64(&format!("WFMP:{source}:YMU?"))?;
        let yzero = self.inst.query_f64(&format!("WFMP:{source}:YZE?"))?;
        let y: Array1<f64> = raw
            .into_iter()
            .map(|value| (value - yoffset) * ymult + yzero)
            .collect();

        let xincr = self.inst.query_f64(&format!("WFMP:{source}:XIN?"))?;
        let points_command = format!("WFMP:{source}:NR_P?");
        let points_reply = self.query(&points_command)?;
        let point_count = parse_point_count(&points_reply).ok_or_else(|| {
            InstrumentError::parse(
                points_command.as_str(),
                points_reply.as_str(),
                "invalid point count",
            )
        })?;
        if point_count > y.len() {
            return Err(InstrumentError::parse(
                points_command.as_str(),
                points_reply.as_str(),
                format!("point count exceeds the {} points transferred", y.len()),
            ));
        }
        let x: Array1<f64> = (0..point_count).map(|i| i as f64 * xincr).collect();

        Ok(Waveform { source, x, y })
    }
}

fn parse_ascii_curve(reply: &str) -> Result<Vec<f64>, InstrumentError> {
    reply
        .split(',')
        .map(|field| {
            field
                .trim()
                .parse::<f64>()
                .map_err(|e| InstrumentError::parse("CURVE?", field, e.to_string()))
        })
        .collect()
}

/// Number of points as a half-open range over the (possibly fractional) count
fn parse_point_count(reply: &str) -> Option<usize> {
    let count: f64 = reply.trim().parse().ok()?;
    if !count.is_finite() || count < 0.0 || count >= usize::MAX as f64 {
        return None;
    }
    Some(count.ceil() as usize)
}
