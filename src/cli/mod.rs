pub(crate) mod command;
pub(crate) mod control;

pub use self::command::{
    Args, Command, FakeArgs, HexPayload, LogLevel, ReadArgs, WriteArgs, WritePath,
};
