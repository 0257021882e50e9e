use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use reveal_core::{Rect, VisualState};

/// Capability a host needs from a rendered element to reveal it.
pub trait Animatable {
    fn name(&self) -> &str {
        ""
    }
    fn visual_state(&self) -> VisualState;
    fn set_visual_state(&self, state: VisualState);
    /// Layout box in page coordinates, untransformed.
    fn bounds(&self) -> Rect;
}

/// Stable-identity reference to a rendered element.
///
/// Starts empty; the rendering layer attaches the element once it exists and
/// detaches it on teardown. Holds the element weakly, so a dropped element
/// resolves to `None` the same as one that never attached.
#[derive(Clone, Default)]
pub struct TargetRef(Rc<RefCell<Option<Weak<dyn Animatable>>>>);

impl TargetRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to<T: Animatable + 'static>(target: &Rc<T>) -> Self {
        let r = Self::new();
        r.attach(target);
        r
    }

    pub fn attach<T: Animatable + 'static>(&self, target: &Rc<T>) {
        let target: Rc<dyn Animatable> = target.clone();
        *self.0.borrow_mut() = Some(Rc::downgrade(&target));
    }

    pub fn detach(&self) {
        self.0.borrow_mut().take();
    }

    pub fn resolve(&self) -> Option<Rc<dyn Animatable>> {
        self.0.borrow().as_ref().and_then(Weak::upgrade)
    }

    pub fn is_attached(&self) -> bool {
        self.resolve().is_some()
    }
}

impl fmt::Debug for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resolve() {
            Some(t) => write!(f, "TargetRef({:?})", t.name()),
            None => f.write_str("TargetRef(<unresolved>)"),
        }
    }
}
