//! Logger setup shared by the binaries. Library code only talks to the `log` facade.

use std::io::Write;

/// Filter variable; accepts the usual `env_logger` syntax (`info`, `goalcast::sampler=debug`, ...).
pub const LOG_ENV: &str = "GOALCAST_LOG";

/// Installs a stderr logger printing `[INFO] message` lines. Later calls are no-ops.
pub fn init() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().filter_or(LOG_ENV, "info"))
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .try_init();
}
