mod invocation;
mod sweeper;

pub use invocation::InvocationTracker;
pub use sweeper::spawn_idle_sweeper;
