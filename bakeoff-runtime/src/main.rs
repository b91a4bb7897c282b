use bakeoff_runtime::BakeoffRuntime;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    bakeoff_runtime::init_logging();
    BakeoffRuntime::new().with_args().run().await
}
