//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `podstate_core` linkage.
//! - With a database path argument, print the calculator page as persisted
//!   for this device's identity.

use podstate_core::{render_text, AppCredentials, CalculatorController, ClientConfig, ClientContext};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("podstate_core ping={}", podstate_core::ping());
    println!("podstate_core version={}", podstate_core::core_version());

    let Some(db_path) = std::env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };

    let config = ClientConfig::new(AppCredentials::default())
        .with_env_token()
        .with_store_path(db_path);
    let client = match ClientContext::open(config) {
        Ok(client) => client,
        Err(err) => {
            eprintln!("podstate: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut controller = CalculatorController::new(&client);
    controller.mount();
    println!();
    println!("{}", render_text(&controller.view_model()));
    controller.unmount();
    ExitCode::SUCCESS
}
