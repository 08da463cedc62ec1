/// Asks the host whether it holds edits that are not yet saved to the project.
///
/// Checking out another branch replaces what the host should display, so a
/// project consults the probe first and warns when work would be shadowed.
pub trait UnsavedWorkProbe: Send + Sync {
    /// Whether the host has unsaved edits.
    fn has_unsaved_work(&self) -> bool;
}

impl<F> UnsavedWorkProbe for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn has_unsaved_work(&self) -> bool {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_closure_probe() {
        let dirty = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&dirty);
        let probe: Box<dyn UnsavedWorkProbe> = Box::new(move || flag.load(Ordering::SeqCst));

        assert!(!probe.has_unsaved_work());
        dirty.store(true, Ordering::SeqCst);
        assert!(probe.has_unsaved_work());
    }
}
