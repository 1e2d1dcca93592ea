pub mod yokogawa7651;

pub use yokogawa7651::{Yokogawa7651, Yokogawa7651Channel};
