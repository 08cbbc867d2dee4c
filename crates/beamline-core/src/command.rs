use std::collections::HashMap;
use std::time::Duration;

use crate::ids::CmdId;
use crate::status::InstCond;

/// A single positional argument or keyword value passed through
/// [`Command::kwargs`]/`args` to a dispatch callback.
///
/// The original source passes Python's dynamically-typed values straight
/// through; this enum is the smallest closed set that every Action in
/// this repository actually needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Float(f64),
    Int(i64),
    Bool(bool),
    /// `inst_conds` payload for wait-family kwargs.
    InstConds(Vec<InstCond>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_inst_conds(&self) -> Option<&[InstCond]> {
        match self {
            Value::InstConds(v) => Some(v),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}
impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

pub type Kwargs = HashMap<String, Value>;

/// `{cmdID, cmd, args, kwargs}` — one queued unit of work on a control.
///
/// `cmd` names either a hardware op (`expose`, `inject`, `stop_flow`, …)
/// or a wait pseudo-op (`wait_time_<id>`, `wait_sync_<id>`,
/// `wait_check_<id>`, `wait_cmd_<id>`).
#[derive(Debug, Clone)]
pub struct Command {
    pub cmd_id: CmdId,
    pub cmd: String,
    pub args: Vec<Value>,
    pub kwargs: Kwargs,
}

impl Command {
    pub fn new(cmd_id: CmdId, cmd: impl Into<String>) -> Self {
        Self {
            cmd_id,
            cmd: cmd.into(),
            args: Vec::new(),
            kwargs: HashMap::new(),
        }
    }

    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn is_wait(&self) -> bool {
        self.cmd.starts_with("wait")
    }

    /// `t_wait` kwarg as a [`Duration`], for `wait_time_*` commands.
    pub fn t_wait(&self) -> Option<Duration> {
        self.kwargs
            .get("t_wait")
            .and_then(Value::as_f64)
            .map(Duration::from_secs_f64)
    }

    /// `inst_conds` kwarg, for `wait_sync_*` / `wait_check_*` / `wait_cmd_*`.
    ///
    /// Lists the *other* participants a barrier waits on, never the
    /// control the command is queued on — that control's own arrival is
    /// implicit in having installed the wait, and listing it here would
    /// make the scheduler try to re-lock its own in-flight control.
    pub fn inst_conds(&self) -> Option<&[InstCond]> {
        self.kwargs.get("inst_conds").and_then(Value::as_inst_conds)
    }

    pub fn condition(&self) -> Option<&str> {
        self.kwargs.get("condition").and_then(Value::as_str)
    }
}

/// The reserved prefixes the scheduler interprets itself; see §6 of the
/// specification ("Reserved wait pseudo-commands").
pub const WAIT_TIME_PREFIX: &str = "wait_time_";
pub const WAIT_SYNC_PREFIX: &str = "wait_sync_";
pub const WAIT_CHECK_PREFIX: &str = "wait_check_";
pub const WAIT_CMD_PREFIX: &str = "wait_cmd_";

/// Reserved `cmd` names the scheduler itself consumes (§6).
pub const CMD_STATUS: &str = "status";
pub const CMD_ABORT: &str = "abort";
pub const CMD_FULL_STATUS: &str = "full_status";
