//! Background-task registry, wire snapshots, and the host-side service.

pub mod service;
pub mod snapshot;
pub mod store;

pub use service::TaskService;
pub use snapshot::{resolve_widget_name, TaskSnapshot, WidgetRef};
pub use store::{
    LifecycleHook, MethodResult, StartHook, TaskError, TaskMethod, TaskSide, TaskSpec, TaskStore,
};
