pub mod tds5xx;

pub use tds5xx::{
    Hardcopy, TekTds5xx, Tds5xxChannel, Tds5xxDataSource, Tds5xxMeasurement,
};
