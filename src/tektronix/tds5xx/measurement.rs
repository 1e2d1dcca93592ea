use super::TekTds5xx;
use crate::error::InstrumentError;
use crate::types::{Direction, Edge, MeasurementReading, MeasurementType, Source};
use chrono::Utc;

/// One of the four automated measurement slots (`MEASU:MEAS<n>`).
pub struct Tds5xxMeasurement<'a> {
    scope: &'a mut TekTds5xx,
    id: usize,
}

impl<'a> Tds5xxMeasurement<'a> {
    pub(super) fn new(scope: &'a mut TekTds5xx, id: usize) -> Self {
        Self { scope, id }
    }

    /// 1-based slot number
    pub fn id(&self) -> usize {
        self.id
    }

    fn header(&self, field: &str) -> String {
        format!("MEASU:MEAS{}:{field}", self.id)
    }

    fn get<T>(&mut self, field: &str) -> Result<T, InstrumentError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        let command = format!("{}?", self.header(field));
        self.scope.inst.query_parsed(&command)
    }

    fn set(&mut self, field: &str, value: impl std::fmt::Display) -> Result<(), InstrumentError> {
        let command = format!("{} {value}", self.header(field));
        self.scope.sendcmd(&command)
    }

    /// Search direction of delay measurements
    pub fn delay_direction(&mut self) -> Result<Direction, InstrumentError> {
        self.get("DEL:DIRE")
    }

    pub fn set_delay_direction(&mut self, direction: Direction) -> Result<(), InstrumentError> {
        self.set("DEL:DIRE", direction)
    }

    /// Edge of the first source that starts a delay measurement
    pub fn delay_edge1(&mut self) -> Result<Edge, InstrumentError> {
        self.get("DEL:EDGE1")
    }

    pub fn set_delay_edge1(&mut self, edge: Edge) -> Result<(), InstrumentError> {
        self.set("DEL:EDGE1", edge)
    }

    /// Edge of the second source that ends a delay measurement
    pub fn delay_edge2(&mut self) -> Result<Edge, InstrumentError> {
        self.get("DEL:EDGE2")
    }

    pub fn set_delay_edge2(&mut self, edge: Edge) -> Result<(), InstrumentError> {
        self.set("DEL:EDGE2", edge)
    }

    pub fn source1(&mut self) -> Result<Source, InstrumentError> {
        self.get("SOURCE")
    }

    pub fn set_source1(&mut self, source: Source) -> Result<(), InstrumentError> {
        self.set("SOURCE", source)
    }

    pub fn source2(&mut self) -> Result<Source, InstrumentError> {
        self.get("SOURCE2")
    }

    pub fn set_source2(&mut self, source: Source) -> Result<(), InstrumentError> {
        self.set("SOURCE2", source)
    }

    /// Whether the measurement is enabled
    pub fn state(&mut self) -> Result<bool, InstrumentError> {
        let command = format!("{}?", self.header("STATE"));
        self.scope.inst.query_bool(&command)
    }

    pub fn set_state(&mut self, enabled: bool) -> Result<(), InstrumentError> {
        self.set("STATE", u8::from(enabled))
    }

    pub fn measurement_type(&mut self) -> Result<MeasurementType, InstrumentError> {
        self.get("TYPE")
    }

    pub fn set_measurement_type(&mut self, kind: MeasurementType) -> Result<(), InstrumentError> {
        self.set("TYPE", kind)
    }

    pub fn units(&mut self) -> Result<String, InstrumentError> {
        let command = format!("{}?", self.header("UNITS"));
        let reply = self.scope.query(&command)?;
        Ok(reply.trim_matches('"').to_string())
    }

    pub fn value(&mut self) -> Result<f64, InstrumentError> {
        self.get("VALUE")
    }

    /// Type, units and current value, stamped with the host time.
    pub fn read(&mut self) -> Result<MeasurementReading, InstrumentError> {
        let measurement_type = self.measurement_type()?;
        let units = self.units()?;
        let value = self.value()?;
        Ok(MeasurementReading {
            id: self.id,
            measurement_type,
            units,
            value,
            timestamp: Utc::now(),
        })
    }
}
