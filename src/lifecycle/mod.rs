mod manager;
mod permission;
mod signals;
pub mod simulated;

pub use manager::CameraLifecycleManager;
pub use permission::{
    check_camera_access, classify_denial, CameraPermissions, PermissionQuery, PermissionState,
    SecureOrigin,
};
pub use signals::LifecycleSignal;
pub use simulated::SimulatedPermissions;
