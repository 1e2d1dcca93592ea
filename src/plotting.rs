use crate::error::InstrumentError;
use crate::types::Waveform;
use textplots::{Chart, Plot, Shape};

const DEFAULT_WIDTH: u32 = 140;
const DEFAULT_HEIGHT: u32 = 60;

/// Determine the best scale and SI prefix for a given maximum magnitude
fn determine_scale(max_value: f64) -> (f64, &'static str) {
    if max_value >= 1.0 {
        (1.0, "")
    } else if max_value >= 1e-3 {
        (1e3, "m")
    } else if max_value >= 1e-6 {
        (1e6, "μ")
    } else if max_value >= 1e-9 {
        (1e9, "n")
    } else {
        (1e12, "p")
    }
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

/// Plot a scope waveform in the terminal, time on the x axis.
///
/// # Examples
/// ```
/// use instrument_kit::plotting::plot_waveform;
/// use instrument_kit::{Source, Waveform};
/// use ndarray::Array1;
///
/// let waveform = Waveform {
///     source: Source::Ch1,
///     x: Array1::linspace(0.0, 1e-3, 50),
///     y: Array1::linspace(-0.2, 0.2, 50),
/// };
/// plot_waveform(&waveform, None, None).unwrap();
/// ```
pub fn plot_waveform(
    waveform: &Waveform,
    width: Option<u32>,
    height: Option<u32>,
) -> Result<(), InstrumentError> {
    if waveform.is_empty() {
        return Err(InstrumentError::InvalidArgument(
            "Cannot plot an empty waveform".to_string(),
        ));
    }
    let width = width.unwrap_or(DEFAULT_WIDTH);
    let height = height.unwrap_or(DEFAULT_HEIGHT);

    let (y_min, y_max) = min_max(waveform.y.iter().copied());
    let (y_scale, y_unit) = determine_scale(y_min.abs().max(y_max.abs()));

    // fall back to sample indices when the time axis is shorter than the data
    let (x_values, x_scale, x_unit): (Vec<f64>, f64, &str) = if waveform.x.len() >= waveform.len() {
        let x: Vec<f64> = waveform.x.iter().take(waveform.y.len()).copied().collect();
        let (_, x_max) = min_max(x.iter().copied());
        let (scale, unit) = determine_scale(x_max.abs());
        (x, scale, unit)
    } else {
        ((0..waveform.y.len()).map(|i| i as f64).collect(), 1.0, "#")
    };

    let frame: Vec<(f32, f32)> = x_values
        .iter()
        .zip(waveform.y.iter())
        .map(|(&x, &y)| ((x * x_scale) as f32, (y * y_scale) as f32))
        .collect();
    let x_start = frame.first().map(|p| p.0).unwrap_or(0.0);
    let mut x_end = frame.last().map(|p| p.0).unwrap_or(0.0);
    if x_end <= x_start {
        x_end = x_start + 1.0;
    }

    println!("{}", waveform.source);
    println!(
        "{} points | Values: {:.3} to {:.3} {}units",
        waveform.len(),
        y_min * y_scale,
        y_max * y_scale,
        y_unit
    );
    println!("{}", "─".repeat(width as usize / 2));

    Chart::new(width, height, x_start, x_end)
        .lineplot(&Shape::Lines(&frame))
        .nice();

    if x_unit == "#" {
        println!("Sample Index →");
    } else {
        println!("Time [{x_unit}s] →");
    }
    Ok(())
}

/// Plot a series of values against their index, e.g. successive measurement
/// readings.
pub fn plot_values(
    values: &[f64],
    title: Option<&str>,
    width: Option<u32>,
    height: Option<u32>,
) -> Result<(), InstrumentError> {
    if values.is_empty() {
        return Err(InstrumentError::InvalidArgument(
            "Cannot plot empty data".to_string(),
        ));
    }
    let width = width.unwrap_or(DEFAULT_WIDTH);
    let height = height.unwrap_or(DEFAULT_HEIGHT);

    let (min_value, max_value) = min_max(values.iter().copied());
    let (value_scale, value_unit) = determine_scale(min_value.abs().max(max_value.abs()));

    let frame: Vec<(f32, f32)> = values
        .iter()
        .enumerate()
        .map(|(i, &value)| (i as f32, (value * value_scale) as f32))
        .collect();
    let max_index = ((values.len() - 1) as f32).max(1.0);

    println!("{}", title.unwrap_or("Data Plot"));
    println!(
        "{} samples | Values: {:.3} to {:.3} {}units",
        values.len(),
        min_value * value_scale,
        max_value * value_scale,
        value_unit
    );
    println!("{}", "─".repeat(width as usize / 2));

    Chart::new(width, height, 0.0, max_index)
        .lineplot(&Shape::Lines(&frame))
        .nice();

    println!("Sample Index →");
    Ok(())
}
