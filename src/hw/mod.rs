mod btleplug_backend;
mod fake_backend;
mod transport;

pub(crate) use self::btleplug_backend::BtleplugTransport;
pub use self::fake_backend::{
    FakeTransport, FakeTransportConfig, ScanFixture, TransportCall, TransportJournal,
};
pub use self::transport::{GattTarget, Transport, WriteMode};
