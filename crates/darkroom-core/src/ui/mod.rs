//! Process-wide interface state: modal stack, toast queue and surface level.

mod modal;
mod surface;
mod toast;

pub use modal::{ExitCallback, Modal, ModalRegistry, ModalStack};
pub use surface::Surface;
pub use toast::{Toast, ToastId, ToastKind, ToastQueue, DEFAULT_TOAST_LIFETIME};
