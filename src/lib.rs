mod app;
mod cli;
mod engine;
mod error;
pub mod ffi;
mod hw;
mod model;
mod queue;
mod registry;
mod telemetry;
mod utils;

pub use app::{run, run_with_log_level};
pub use cli::{Args, Command, FakeArgs, HexPayload, LogLevel, ReadArgs, WriteArgs, WritePath};
pub use engine::{Backend, BleEngine, Completion, EngineConfig, EngineStats};
pub use error::{
    ArgumentError, CompletionError, ControlError, FixtureError, TransportError,
};
pub use hw::{
    FakeTransport, FakeTransportConfig, GattTarget, ScanFixture, Transport, TransportCall,
    TransportJournal, WriteMode,
};
pub use model::{DeviceAddress, DeviceInfo, MAX_NAME_LEN, Task, TaskKind, TaskOutput};
pub use queue::{QueueName, TaskQueue, TaskReceiver, task_queue};
pub use registry::DeviceRegistry;
