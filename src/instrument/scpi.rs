use super::Instrument;
use crate::error::InstrumentError;
use crate::utils::{poll_until, PollError};
use serde::Serialize;
use std::time::Duration;

/// Parsed `*IDN?` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub manufacturer: String,
    pub model: String,
    pub serial: String,
    pub firmware: String,
}

impl Identity {
    /// Split a `manufacturer,model,serial,firmware` reply. Missing trailing
    /// fields are left empty; some older instruments only send two.
    pub fn parse(reply: &str) -> Result<Self, InstrumentError> {
        let mut fields = reply.trim().splitn(4, ',').map(|f| f.trim().to_string());
        let manufacturer = fields.next().unwrap_or_default();
        if manufacturer.is_empty() {
            return Err(InstrumentError::parse("*IDN?", reply, "empty identity"));
        }
        Ok(Self {
            manufacturer,
            model: fields.next().unwrap_or_default(),
            serial: fields.next().unwrap_or_default(),
            firmware: fields.next().unwrap_or_default(),
        })
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.manufacturer, self.model)?;
        if !self.serial.is_empty() {
            write!(f, " (s/n {})", self.serial)?;
        }
        if !self.firmware.is_empty() {
            write!(f, " fw {}", self.firmware)?;
        }
        Ok(())
    }
}

/// IEEE-488.2 common commands
impl Instrument {
    pub fn identify(&mut self) -> Result<Identity, InstrumentError> {
        let reply = self.query("*IDN?")?;
        Identity::parse(&reply)
    }

    pub fn reset(&mut self) -> Result<(), InstrumentError> {
        self.sendcmd("*RST")
    }

    /// Clear the status registers and error queue
    pub fn clear(&mut self) -> Result<(), InstrumentError> {
        self.sendcmd("*CLS")
    }

    /// Bus trigger
    pub fn trigger(&mut self) -> Result<(), InstrumentError> {
        self.sendcmd("*TRG")
    }

    pub fn operation_complete(&mut self) -> Result<bool, InstrumentError> {
        self.query_bool("*OPC?")
    }

    /// Poll `*OPC?` until pending operations have finished.
    pub fn wait_for_operation_complete(
        &mut self,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<(), InstrumentError> {
        poll_until(|| self.operation_complete(), timeout, poll_interval).map_err(|e| match e {
            PollError::Timeout => InstrumentError::Timeout,
            PollError::ConditionError(e) => e,
        })
    }

    /// Run the instrument self test. `Ok(true)` means it passed.
    pub fn self_test(&mut self) -> Result<bool, InstrumentError> {
        let code: i64 = self.query_parsed("*TST?")?;
        Ok(code == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::Loopback;

    #[test]
    fn test_identify() {
        let (mut inst, _) = Instrument::loopback(
            Loopback::new().reply("*IDN?", "TEKTRONIX,TDS 540A,0,CF:91.1CT FV:v1.0.2e"),
        )
        .unwrap();
        let id = inst.identify().unwrap();
        assert_eq!(id.manufacturer, "TEKTRONIX");
        assert_eq!(id.model, "TDS 540A");
        assert_eq!(id.serial, "0");
        assert_eq!(id.firmware, "CF:91.1CT FV:v1.0.2e");
        assert_eq!(
            id.to_string(),
            "TEKTRONIX TDS 540A (s/n 0) fw CF:91.1CT FV:v1.0.2e"
        );
    }

    #[test]
    fn test_identity_short_reply() {
        let id = Identity::parse("YOKOGAWA,7651").unwrap();
        assert_eq!(id.model, "7651");
        assert!(id.serial.is_empty());
        assert!(Identity::parse("  ").is_err());
    }

    #[test]
    fn test_common_commands() {
        let (mut inst, log) = Instrument::loopback(
            Loopback::new()
                .expect("*RST")
                .expect("*CLS")
                .expect("*TRG")
                .reply("*TST?", "0"),
        )
        .unwrap();
        inst.reset().unwrap();
        inst.clear().unwrap();
        inst.trigger().unwrap();
        assert!(inst.self_test().unwrap());
        assert_eq!(log.commands(), vec!["*RST", "*CLS", "*TRG", "*TST?"]);
    }

    #[test]
    fn test_wait_for_operation_complete() {
        let (mut inst, log) = Instrument::loopback(
            Loopback::new()
                .reply("*OPC?", "0")
                .reply("*OPC?", "0")
                .reply("*OPC?", "1"),
        )
        .unwrap();
        inst.wait_for_operation_complete(Duration::from_secs(1), Duration::from_millis(1))
            .unwrap();
        assert_eq!(log.commands().len(), 3);
    }

    #[test]
    fn test_wait_for_operation_complete_times_out() {
        let (mut inst, _) =
            Instrument::loopback(Loopback::new().reply("*OPC?", "0")).unwrap();
        assert!(matches!(
            inst.wait_for_operation_complete(Duration::ZERO, Duration::ZERO),
            Err(InstrumentError::Timeout)
        ));
    }
}
