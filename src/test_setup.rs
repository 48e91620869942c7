#[cfg(test)]
#[ctor::ctor]
fn init_tests() {
    // initialize a logger only for tests (to see trace logs based on RUST_LOG)
    let _ = env_logger::builder().is_test(true).try_init();
}
