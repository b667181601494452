//! # gateway-supervisor
//!
//! `gateway-supervisor` keeps one long-running gateway process under control.
//! It launches the gateway in its own process group, captures its merged
//! output into a bounded buffer, and stops it gracefully (SIGTERM to the whole
//! group, SIGKILL after a grace period) when asked.
//!
//! ## Quick example
//!
//! ```rust,no_run
//! use gateway_supervisor::SupervisorBuilder;
//!
//! #[tokio::main]
//! async fn main() {
//!     let supervisor = SupervisorBuilder::new("/usr/local/bin/gateway")
//!         .with_args(["gateway"])
//!         .build()
//!         .into_handle();
//!
//!     let started = supervisor.start().await;
//!     println!("{}", started.message);
//!
//!     let status = supervisor.status().await;
//!     println!("running: {}, uptime: {:?}", status.running, status.uptime_seconds);
//!
//!     supervisor.stop().await;
//! }
//! ```
//!
//! ## API overview
//!
//! | SupervisorHandle method | Purpose                                                    |
//! | ----------------------- | ---------------------------------------------------------- |
//! | `start().await`         | Launch the gateway unless it is already running            |
//! | `stop().await`          | SIGTERM the process group, SIGKILL after the grace period  |
//! | `restart().await`       | Stop, wait a short cooldown, start again                   |
//! | `status().await`        | Liveness, pid, uptime and the most recent output lines     |
//! | `shutdown().await`      | Best-effort stop used when the supervisor itself exits     |
//!
//! Every operation returns a value; failures are reported through
//! `OperationResult::success` and never leave the supervisor unusable.

pub use process::output::LogBuffer;
pub use supervisor::{
    builder::SupervisorBuilder,
    handle::SupervisorHandle,
    report::{OperationResult, StatusReport},
    Supervisor, SupervisorError,
};

pub mod env_file;
pub mod http;
mod process;
mod supervisor;
