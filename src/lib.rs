pub use faer;

pub mod error;

mod cost;
mod example;
mod gradient;
mod layer;
mod network;
mod optimizer;
mod pretty_print;
mod record;
mod transfer;

pub use cost::*;
pub use error::{Error, Result};
pub use example::*;
pub use gradient::*;
pub use layer::*;
pub use network::*;
pub use optimizer::*;
pub use pretty_print::*;
pub use record::*;
pub use transfer::*;
