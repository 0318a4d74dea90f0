#![allow(dead_code)]

use forq::WorkerSpec;

/// Installs a test tracing subscriber honoring `RUST_LOG`. Safe to call from
/// every test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A worker spec running a shell snippet.
pub fn sh(script: &str) -> WorkerSpec {
    WorkerSpec::new("/bin/sh").arg("-c").arg(script)
}

/// Shell snippet emitting a protocol message on stdout.
pub fn emit(event: &str, data: &str) -> String {
    format!(r#"printf '{{"event":"{event}","data":{data}}}\n'"#)
}
