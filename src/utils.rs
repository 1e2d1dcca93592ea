use std::time::{Duration, Instant};

/// Error type for polling operations
#[derive(Debug)]
pub enum PollError<E> {
    /// Condition never became true in time
    Timeout,
    /// The condition itself failed
    ConditionError(E),
}

impl<E> std::fmt::Display for PollError<E>
where
    E: std::fmt::Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollError::Timeout => write!(f, "Operation timed out"),
            PollError::ConditionError(e) => write!(f, "Condition error: {}", e),
        }
    }
}

impl<E> std::error::Error for PollError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PollError::Timeout => None,
            PollError::ConditionError(e) => Some(e),
        }
    }
}

/// Call `condition` every `poll_interval` until it returns `Ok(true)`.
///
/// The condition is always evaluated at least once, so a zero timeout still
/// gives an instrument that is already done a chance to say so.
///
/// # Example
/// ```no_run
/// use std::time::Duration;
/// use instrument_kit::utils::poll_until;
/// use instrument_kit::Instrument;
///
/// let mut scope = Instrument::open_tcpip("192.168.0.2", 4000)?;
/// scope.sendcmd("ACQ:STATE RUN")?;
/// poll_until(
///     || scope.operation_complete(),
///     Duration::from_secs(10),
///     Duration::from_millis(100),
/// )?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn poll_until<F, E>(
    mut condition: F,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(), PollError<E>>
where
    F: FnMut() -> Result<bool, E>,
{
    let start = Instant::now();

    loop {
        match condition() {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => return Err(PollError::ConditionError(e)),
        }

        if start.elapsed() >= timeout {
            return Err(PollError::Timeout);
        }
        std::thread::sleep(poll_interval);
    }
}

/// Format `value` in the `d.dddE±XX` scientific form Tektronix scopes expect
/// (`format_sci(0.001, 3) == "1.000E-03"`).
pub fn format_sci(value: f64, precision: usize) -> String {
    let rendered = format!("{:.*e}", precision, value);
    match rendered.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{mantissa}E{sign}{:02}", exponent.abs())
        }
        None => rendered.to_uppercase(),
    }
}

/// Shortest decimal that round-trips, always with a fractional part or exponent.
/// Exponents carry a sign and at least two digits (`1.0`, `0.001`, `1e-05`, `1e+16`).
pub fn format_float(value: f64) -> String {
    let rendered = format!("{value:?}");
    match rendered.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exponent.abs())
        }
        None => rendered,
    }
}

/// Interpret an integer flag reply such as `1`, `0` or `1\n`.
pub fn parse_int_bool(reply: &str) -> Option<bool> {
    reply.trim().parse::<i64>().ok().map(|v| v != 0)
}
