mod driver;

pub use driver::{Connection, Connector};
