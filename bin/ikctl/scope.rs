use chrono::Local;
use clap::Subcommand;
use instrument_kit::config::AppConfig;
use instrument_kit::plotting::{plot_values, plot_waveform};
use instrument_kit::{
    DataLogger, Instrument, InstrumentError, MeasurementReading, Source, TekTds5xx,
    WaveformEncoding,
};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

#[derive(Subcommand, Debug)]
pub enum ScopeCommand {
    /// Transfer and scale a waveform
    Waveform {
        /// CH1-4, MATH1-3 or REF1-4
        #[arg(short, long, default_value = "CH1")]
        source: Source,
        /// Use ASCII instead of binary transfer
        #[arg(long)]
        ascii: bool,
        /// Plot the waveform in the terminal
        #[arg(long)]
        plot: bool,
        /// Write the waveform as JSON
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Print one reading of a measurement slot
    Measure {
        #[arg(value_parser = clap::value_parser!(u8).range(1..=4))]
        slot: u8,
    },
    /// Log readings of a measurement slot until Ctrl+C
    Monitor {
        #[arg(value_parser = clap::value_parser!(u8).range(1..=4))]
        slot: u8,
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
        /// Data file, overrides logging.data_path
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
        /// Plot the collected values when stopped
        #[arg(long)]
        plot: bool,
    },
    /// Save a screenshot (.bmp as received, other extensions are converted)
    Hardcopy {
        #[arg(short, long, value_name = "FILE")]
        out: PathBuf,
    },
    /// List the sources that are turned on
    Sources,
    /// Print the scope clock
    Clock {
        /// Set the scope clock from the host first
        #[arg(long)]
        sync: bool,
    },
}

pub fn run(
    command: ScopeCommand,
    inst: Instrument,
    config: &AppConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut tek = TekTds5xx::new(inst).with_hardcopy_wait(config.scope.hardcopy_wait());

    match command {
        ScopeCommand::Waveform {
            source,
            ascii,
            plot,
            out,
        } => {
            let encoding = if ascii {
                WaveformEncoding::Ascii
            } else {
                config.scope.default_encoding
            };
            let started = Instant::now();
            let waveform = tek.read_waveform(source, encoding)?;
            info!("Transfer took {:.2?}", started.elapsed());

            print!("{}: {} points", waveform.source, waveform.len());
            if let Some(dt) = waveform.dt() {
                print!(", dt = {dt:e} s");
            }
            if let Some((lo, hi)) = waveform.y_range() {
                print!(", y in [{lo:e}, {hi:e}]");
            }
            println!();

            if plot {
                plot_waveform(&waveform, None, None)?;
            }
            if let Some(path) = out {
                let file = std::fs::File::create(&path)
                    .map_err(|e| InstrumentError::io(e, format!("creating {}", path.display())))?;
                serde_json::to_writer_pretty(file, &waveform)?;
                info!("Waveform written to {}", path.display());
            }
        }
        ScopeCommand::Measure { slot } => {
            let reading = tek.measurement(slot as usize - 1)?.read()?;
            print_reading(&reading);
        }
        ScopeCommand::Monitor {
            slot,
            interval_ms,
            out,
            plot,
        } => {
            let path = out.unwrap_or_else(|| config.logging.data_path.clone());
            let mut logger = DataLogger::new(
                path,
                config.logging.buffer_size,
                config.logging.final_json,
            );
            let shutdown = setup_shutdown_handler()?;
            let values = monitor(
                &mut tek,
                slot as usize - 1,
                Duration::from_millis(interval_ms),
                &mut logger,
                &shutdown,
            )?;
            logger.finalize_as_json()?;
            info!("{} readings written to {}", values.len(), logger.path().display());

            if plot && !values.is_empty() {
                plot_values(&values, Some(&format!("MEAS{slot}")), None, None)?;
            }
        }
        ScopeCommand::Hardcopy { out } => {
            let hardcopy = tek.hardcopy()?;
            hardcopy.save(&out)?;
        }
        ScopeCommand::Sources => {
            for source in tek.sources()? {
                println!("{source}");
            }
        }
        ScopeCommand::Clock { sync } => {
            if sync {
                tek.set_clock(Local::now().naive_local())?;
            }
            println!("{}", tek.clock()?);
        }
    }
    Ok(())
}

/// Read `slot` every `interval` until `shutdown` is set. Returns the values read.
fn monitor(
    tek: &mut TekTds5xx,
    slot: usize,
    interval: Duration,
    logger: &mut DataLogger<MeasurementReading>,
    shutdown: &AtomicBool,
) -> Result<Vec<f64>, InstrumentError> {
    let mut values = Vec::new();
    info!("Monitoring MEAS{}, Ctrl+C to stop", slot + 1);

    while !shutdown.load(Ordering::SeqCst) {
        let started = Instant::now();
        if let Some(reading) = sample(tek, slot)? {
            print_reading(&reading);
            values.push(reading.value);
            logger.add(reading)?;
        }

        // sleep in short steps so Ctrl+C is handled promptly
        while started.elapsed() < interval && !shutdown.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(50).min(interval));
        }
    }

    info!("Monitor stopped");
    logger.flush()?;
    Ok(values)
}

/// One reading of `slot`, or `None` after a timeout. Input is flushed on a
/// timeout so a late reply is not taken as the answer to the next query.
fn sample(
    tek: &mut TekTds5xx,
    slot: usize,
) -> Result<Option<MeasurementReading>, InstrumentError> {
    let result = tek.measurement(slot)?.read();
    match result {
        Ok(reading) => Ok(Some(reading)),
        Err(InstrumentError::Timeout) => {
            warn!("Measurement read timed out, retrying");
            tek.instrument().flush_input()?;
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn print_reading(reading: &MeasurementReading) {
    println!(
        "{} MEAS{} {}: {} {}",
        reading.timestamp.format("%H:%M:%S%.3f"),
        reading.id,
        reading.measurement_type,
        reading.value,
        reading.units
    );
}

/// Setup Ctrl+C handler for graceful shutdown
fn setup_shutdown_handler() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_clone = shutdown_flag.clone();

    ctrlc::set_handler(move || {
        info!("Ctrl+C received - stopping...");
        shutdown_flag_clone.store(true, Ordering::SeqCst);
    })?;

    Ok(shutdown_flag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use instrument_kit::comm::Transport;
    use instrument_kit::{Loopback, StreamCommunicator};
    use std::collections::VecDeque;
    use std::io::{ErrorKind, Read, Write};

    /// Scripted link whose first reply only shows up after the read timed out
    struct LateFirstReply {
        script: VecDeque<(&'static str, &'static str)>,
        partial: Vec<u8>,
        pending: Vec<u8>,
        late: Option<Vec<u8>>,
        delayed: bool,
    }

    impl LateFirstReply {
        fn new(script: &[(&'static str, &'static str)]) -> Self {
            Self {
                script: script.iter().copied().collect(),
                partial: Vec::new(),
                pending: Vec::new(),
                late: None,
                delayed: false,
            }
        }
    }

    impl Read for LateFirstReply {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pending.is_empty() {
                if let Some(late) = self.late.take() {
                    self.pending = late;
                }
                return Err(std::io::Error::new(ErrorKind::TimedOut, "no reply yet"));
            }
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            Ok(n)
        }
    }

    impl Write for LateFirstReply {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            for &byte in buf {
                if byte != b'\n' {
                    self.partial.push(byte);
                    continue;
                }
                let raw = std::mem::take(&mut self.partial);
                let line = String::from_utf8_lossy(&raw).into_owned();
                let (command, reply) = self.script.pop_front().ok_or_else(|| {
                    std::io::Error::new(ErrorKind::InvalidData, "script exhausted")
                })?;
                assert_eq!(line, command);
                let reply = format!("{reply}\n").into_bytes();
                if self.delayed {
                    self.pending.extend(reply);
                } else {
                    self.late = Some(reply);
                    self.delayed = true;
                }
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Transport for LateFirstReply {
        fn clear_input(&mut self) -> std::io::Result<()> {
            self.pending.clear();
            Ok(())
        }

        fn set_timeout(&mut self, _timeout: Duration) -> std::io::Result<()> {
            Ok(())
        }

        fn describe(&self) -> String {
            "late-first-reply".to_string()
        }
    }

    #[test]
    fn test_sample_discards_late_reply_after_timeout() {
        let link = LateFirstReply::new(&[
            ("MEASU:MEAS1:TYPE?", "FALL"),
            ("MEASU:MEAS1:TYPE?", "MEAN"),
            ("MEASU:MEAS1:UNITS?", "\"V\""),
            ("MEASU:MEAS1:VALUE?", "0.25"),
        ]);
        let comm = StreamCommunicator::new(link, Duration::from_millis(10)).unwrap();
        let inst = Instrument::builder()
            .communicator(Box::new(comm))
            .build()
            .unwrap();
        let mut tek = TekTds5xx::new(inst);

        assert!(sample(&mut tek, 0).unwrap().is_none());
        let reading = sample(&mut tek, 0).unwrap().unwrap();
        assert_eq!(reading.units, "V");
        assert_eq!(reading.value, 0.25);
        assert_eq!(reading.measurement_type.to_string(), "MEAN");
    }

    #[test]
    fn test_monitor_stops_when_flag_set() {
        let (inst, _) = Instrument::loopback(
            Loopback::new()
                .reply("MEASU:MEAS1:TYPE?", "MEAN")
                .reply("MEASU:MEAS1:UNITS?", "\"V\"")
                .reply("MEASU:MEAS1:VALUE?", "0.25"),
        )
        .unwrap();
        let mut tek = TekTds5xx::new(inst);
        let dir = tempfile::tempdir().unwrap();
        let mut logger = DataLogger::new(dir.path().join("meas.jsonl"), 8, false);

        // already set: nothing is read
        let stopped = AtomicBool::new(true);
        let values = monitor(&mut tek, 0, Duration::ZERO, &mut logger, &stopped).unwrap();
        assert!(values.is_empty());
    }
}
