use std::cell::Cell;
use std::rc::Rc;

/// A cleanup action that runs at most once, no matter how many clones of the
/// guard ask for it.
#[derive(Clone)]
pub struct Dispose(Rc<Cell<Option<Box<dyn FnOnce()>>>>);

impl Dispose {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Rc::new(Cell::new(Some(Box::new(f)))))
    }

    /// Safe to call repeatedly, including from inside the cleanup itself.
    pub fn run(&self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }

    pub fn has_run(&self) -> bool {
        let f = self.0.take();
        let ran = f.is_none();
        self.0.set(f);
        ran
    }
}

impl std::fmt::Debug for Dispose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispose")
            .field("pending", &!self.has_run())
            .finish()
    }
}

/// Acquires a resource now and ties its `Dispose` to the current scope, if
/// there is one. The guard is returned either way.
pub fn effect<F>(acquire: F) -> Dispose
where
    F: FnOnce() -> Dispose,
{
    let guard = acquire();
    if let Some(scope) = crate::scope::current_scope() {
        let guard = guard.clone();
        scope.add_disposer(move || guard.run());
    }
    guard
}

pub fn on_unmount(f: impl FnOnce() + 'static) -> Dispose {
    Dispose::new(f)
}
