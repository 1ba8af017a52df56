use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use smap_core::{LayerId, MapManager, OverlayEvent, SourceTrigger, TimerId};

use crate::engine::LeafletEngine;

pub type SharedManager = Rc<RefCell<MapManager<LeafletEngine>>>;

/// Something the browser told us about.
#[derive(Debug)]
pub enum Dispatch {
    Layer { layer: LayerId, event: OverlayEvent },
    Source { layer: LayerId, trigger: SourceTrigger },
    Timer { layer: LayerId, timer: TimerId },
}

/// Event queue between browser callbacks and the manager.
///
/// Leaflet fires some events synchronously from inside calls the manager
/// makes (`openPopup` emits `popupopen` before returning). Those land in the
/// queue while the manager is borrowed and are applied by whoever holds it
/// once the current call is done.
#[derive(Default)]
pub struct Dispatcher {
    queue: RefCell<VecDeque<Dispatch>>,
    manager: RefCell<Weak<RefCell<MapManager<LeafletEngine>>>>,
}

impl Dispatcher {
    pub fn bind(&self, manager: &SharedManager) {
        *self.manager.borrow_mut() = Rc::downgrade(manager);
    }

    pub fn send(&self, dispatch: Dispatch) {
        self.queue.borrow_mut().push_back(dispatch);
        self.drain();
    }

    /// Apply queued events unless the manager is busy.
    pub fn drain(&self) {
        let Some(manager) = self.manager.borrow().upgrade() else {
            self.queue.borrow_mut().clear();
            return;
        };
        let Ok(mut m) = manager.try_borrow_mut() else {
            return;
        };
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(dispatch) = next else {
                break;
            };
            apply(&mut m, dispatch);
        }
    }
}

fn apply(m: &mut MapManager<LeafletEngine>, dispatch: Dispatch) {
    match dispatch {
        Dispatch::Layer { layer, event } => {
            m.handle_layer_event(layer, event);
        }
        Dispatch::Source { layer, trigger } => {
            m.handle_source_trigger(layer, trigger);
        }
        Dispatch::Timer { layer, timer } => {
            m.engine_mut().timer_fired(timer);
            m.run_scheduled_reveal(layer, timer);
        }
    }
}
