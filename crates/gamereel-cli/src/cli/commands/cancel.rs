//! `gamereel cancel`: ask the active run to stop admitting a game's angles.

use anyhow::Result;
use gamereel_core::control::{default_control_socket_path, CancelTarget};

use crate::cli::control_socket;

pub fn parse_target(arg: &str) -> CancelTarget {
    match arg.trim() {
        "all" => CancelTarget::All,
        id => CancelTarget::Job(id.to_string()),
    }
}

pub async fn run_cancel(arg: &str) -> Result<()> {
    let target = parse_target(arg);
    let socket = default_control_socket_path()?;
    control_socket::send_cancel(&socket, &target).await?;
    println!("sent: {}", target);
    Ok(())
}
