/// Domain-aware logging macros.
///
/// Each macro injects a `domain` field automatically so callers never need
/// to remember the string literal. The domain is one of: `sched` (the
/// Automator's scheduling loop), `action` (Action lifecycle), `pump` (the
/// HPLC pump-flow engine), `conn` (dispatch callback / driver I/O), `sys`
/// (bootstrap and shutdown).
///
/// # Usage
///
/// ```ignore
/// use crate::log_macros::*;
///
/// bl_info!(sched, control = %name, "scheduler bootstrapped");
/// bl_warn!(pump, path = %path, "stop_vol exceeded remaining volume");
/// bl_debug!(conn, cmd = %cmd, "dispatch returned");
/// ```
#[doc(hidden)]
macro_rules! bl_log {
    ($level:ident, $domain:ident, $($field:tt)*) => {
        tracing::$level!(domain = stringify!($domain), $($field)*)
    };
}

macro_rules! bl_error {
    ($domain:ident, $($rest:tt)*) => {
        bl_log!(error, $domain, $($rest)*)
    };
}

macro_rules! bl_warn {
    ($domain:ident, $($rest:tt)*) => {
        bl_log!(warn, $domain, $($rest)*)
    };
}

macro_rules! bl_info {
    ($domain:ident, $($rest:tt)*) => {
        bl_log!(info, $domain, $($rest)*)
    };
}

macro_rules! bl_debug {
    ($domain:ident, $($rest:tt)*) => {
        bl_log!(debug, $domain, $($rest)*)
    };
}

#[allow(unused_macros)]
macro_rules! bl_trace {
    ($domain:ident, $($rest:tt)*) => {
        bl_log!(trace, $domain, $($rest)*)
    };
}
