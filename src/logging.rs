// Logging setup for the binary

use std::sync::OnceLock;

static INIT: OnceLock<()> = OnceLock::new();

/// Install env_logger once. `RUST_LOG` wins; otherwise `info`, or `debug` when verbose.
pub fn init_logging(verbose: bool) {
    INIT.get_or_init(|| {
        let default = if verbose { "debug" } else { "info" };
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
            .format(|buf, record| {
                use std::io::Write;
                let ts = buf.timestamp_millis();
                writeln!(
                    buf,
                    "{ts} [{:<5}] {} {}",
                    record.level(),
                    record.target(),
                    record.args()
                )
            })
            .try_init(); // tests may have installed a logger already
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_logging(false);
        init_logging(true);
        log::info!("logger installed");
    }
}
