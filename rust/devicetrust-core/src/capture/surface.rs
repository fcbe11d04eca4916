use super::types::PlatformError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Platform capture-prevention primitive (`FLAG_SECURE`, a secure text-field
/// overlay, ...).
pub trait CaptureSurface: Send + Sync {
    fn set_secure(&self, secure: bool) -> Result<(), PlatformError>;
}

type SurfaceHook = Box<dyn Fn(bool) -> Result<(), PlatformError> + Send + Sync>;

/// In-process secure flag.
///
/// The host rendering layer reads [`is_secure`](Self::is_secure), or installs
/// a hook that applies the flag to the real window. The flag only changes
/// when the hook succeeds.
pub struct FlagSurface {
    secure: AtomicBool,
    toggles: AtomicU64,
    hook: Option<SurfaceHook>,
}

impl FlagSurface {
    pub fn new() -> Self {
        Self {
            secure: AtomicBool::new(false),
            toggles: AtomicU64::new(0),
            hook: None,
        }
    }

    pub fn with_hook<F>(hook: F) -> Self
    where
        F: Fn(bool) -> Result<(), PlatformError> + Send + Sync + 'static,
    {
        Self {
            hook: Some(Box::new(hook)),
            ..Self::new()
        }
    }

    pub fn is_secure(&self) -> bool {
        self.secure.load(Ordering::SeqCst)
    }

    /// Number of successful `set_secure` calls.
    pub fn toggle_count(&self) -> u64 {
        self.toggles.load(Ordering::Relaxed)
    }
}

impl Default for FlagSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSurface for FlagSurface {
    fn set_secure(&self, secure: bool) -> Result<(), PlatformError> {
        if let Some(hook) = &self.hook {
            hook(secure)?;
        }
        self.secure.store(secure, Ordering::SeqCst);
        self.toggles.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_surface_toggles() {
        let surface = FlagSurface::new();
        assert!(!surface.is_secure());
        surface.set_secure(true).unwrap();
        assert!(surface.is_secure());
        surface.set_secure(false).unwrap();
        assert!(!surface.is_secure());
        assert_eq!(surface.toggle_count(), 2);
    }

    #[test]
    fn test_failing_hook_leaves_flag_untouched() {
        let surface =
            FlagSurface::with_hook(|_| Err(PlatformError::Failed("window detached".into())));
        assert!(surface.set_secure(true).is_err());
        assert!(!surface.is_secure());
        assert_eq!(surface.toggle_count(), 0);
    }
}
