//! Container runtime adapter implementations.
//!
//! | Adapter | Backend | Use |
//! |---------|---------|-----|
//! | [`DockerRuntime`] | host `docker` CLI | production |
//! | [`FakeRuntime`] | in-memory | tests |

mod docker;
mod fake;

pub use docker::{DockerRuntime, MANAGED_LABEL, PORT_LABEL, PREFIX_LABEL};
pub use fake::FakeRuntime;
