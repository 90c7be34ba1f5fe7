pub mod config;
pub mod escalation;
pub mod feed;
pub mod handlers;
pub mod lifecycle;
pub mod middleware;
pub mod notify;
pub mod observability;
pub mod server;

pub use config::{
    AppConfig, DirectoryConfig, EscalationConfig, FeedConfig, LoggingConfig, NotificationsConfig,
    ServerConfig,
};
pub use escalation::{
    EscalationScheduler, IntervalTicker, ManualTickHandle, ManualTicker, ScanError, ScanReport,
    Ticker,
};
pub use lifecycle::{LifecycleController, LifecycleError, LifecycleResult};
pub use notify::{InitialNotifier, NotifyError, NotifyMark, NotifyOutcome};
pub use observability::init_tracing;
pub use server::{AppState, RoadguardServer, ServerBuilder, build_app};
