fn main() {
    if let Err(e) = intake_sync_lib::run() {
        tracing::error!(error = %e, "Run aborted");
        eprintln!("intake-sync: {e}");
        std::process::exit(1);
    }
}
