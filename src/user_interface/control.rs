//! Retained tree of overlay widgets.
//!
//! A [`Control`] owns its hooks and two lists of children. Regular children are painted between
//! the parent's `pre_paint` and `post_paint`, independent children after the parent has finished.
//! Lifecycle calls only reach the direct children of the control they are invoked on.

use glam::DVec3;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use std::sync::atomic::{AtomicU32, Ordering};

pub type ControlId = u32;

static CONTROL_ID_COUNTER: AtomicU32 = AtomicU32::new(1);

/// Per-frame values made available to painting controls
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameStats {
    pub frame_time_ms: f64,
    pub object_count: usize,
    pub camera_position: DVec3,
    /// Window inner size in pixels
    pub display_size: [u32; 2],
}

/// Things controls can ask the engine to do after the frame
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverlayRequests {
    pub screenshot: bool,
}

pub struct PaintContext<'a> {
    pub egui: &'a egui::Context,
    pub stats: &'a FrameStats,
    pub requests: &'a mut OverlayRequests,
}

/// Behaviour of a control. All hooks default to doing nothing.
pub trait ControlHooks {
    fn on_initialize(&mut self) {}
    fn pre_paint(&mut self) {}
    fn paint(&mut self, _context: &mut PaintContext) {}
    fn post_paint(&mut self) {}
    fn refresh(&mut self) {}
    fn pre_render(&mut self) {}
    fn post_render(&mut self) {}
}

pub struct Control {
    id: ControlId,
    hooks: Box<dyn ControlHooks>,
    children: Vec<Control>,
    independent_children: Vec<Control>,
}

impl Control {
    pub fn new(hooks: impl ControlHooks + 'static) -> Self {
        Self {
            id: CONTROL_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            hooks: Box::new(hooks),
            children: Vec::new(),
            independent_children: Vec::new(),
        }
    }

    pub fn id(&self) -> ControlId {
        self.id
    }

    // ~~ Children ~~

    pub fn add_child(&mut self, child: Control) -> ControlId {
        let id = child.id;
        self.children.push(child);
        id
    }

    pub fn add_independent_child(&mut self, child: Control) -> ControlId {
        let id = child.id;
        self.independent_children.push(child);
        id
    }

    pub fn remove_child(&mut self, id: ControlId) -> Option<Control> {
        let index = self.children.iter().position(|c| c.id == id)?;
        Some(self.children.remove(index))
    }

    pub fn remove_independent_child(&mut self, id: ControlId) -> Option<Control> {
        let index = self.independent_children.iter().position(|c| c.id == id)?;
        Some(self.independent_children.remove(index))
    }

    /// Drops children last to first
    pub fn destroy_children(&mut self, include_independent: bool) {
        while self.children.pop().is_some() {}
        if include_independent {
            self.destroy_independent_children();
        }
    }

    pub fn destroy_independent_children(&mut self) {
        while self.independent_children.pop().is_some() {}
    }

    pub fn children(&self) -> &[Control] {
        &self.children
    }

    pub fn independent_children(&self) -> &[Control] {
        &self.independent_children
    }

    // ~~ Lifecycle ~~

    pub fn initialize(&mut self) {
        self.hooks.on_initialize();
        self.for_each_child(|c| c.hooks.on_initialize());
    }

    pub fn update(&mut self, context: &mut PaintContext) {
        self.hooks.pre_paint();
        {
            self.hooks.paint(context);

            for child in &mut self.children {
                child.hooks.pre_paint();
            }
            for child in &mut self.children {
                child.hooks.paint(context);
            }
            for child in &mut self.children {
                child.hooks.post_paint();
            }
        }
        self.hooks.post_paint();

        for child in &mut self.independent_children {
            child.hooks.pre_paint();
        }
        for child in &mut self.independent_children {
            child.hooks.paint(context);
        }
        for child in &mut self.independent_children {
            child.hooks.post_paint();
        }
    }

    pub fn refresh_resources(&mut self) {
        self.hooks.refresh();
        self.for_each_child(|c| c.hooks.refresh());
    }

    pub fn pre_update(&mut self) {
        self.hooks.pre_render();
        self.for_each_child(|c| c.hooks.pre_render());
    }

    pub fn post_update(&mut self) {
        self.hooks.post_render();
        self.for_each_child(|c| c.hooks.post_render());
    }

    /// Children then independent children
    fn for_each_child(&mut self, mut f: impl FnMut(&mut Control)) {
        self.children.iter_mut().for_each(&mut f);
        self.independent_children.iter_mut().for_each(&mut f);
    }
}

impl Drop for Control {
    fn drop(&mut self) {
        self.destroy_children(true);
    }
}

// ~~ Tests ~~

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    type Log = Rc<RefCell<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        log: Log,
    }

    impl Recorder {
        fn control(name: &'static str, log: &Log) -> Control {
            Control::new(Self {
                name,
                log: log.clone(),
            })
        }

        fn push(&self, hook: &str) {
            self.log.borrow_mut().push(format!("{}.{}", self.name, hook));
        }
    }

    impl ControlHooks for Recorder {
        fn on_initialize(&mut self) {
            self.push("init");
        }
        fn pre_paint(&mut self) {
            self.push("pre");
        }
        fn paint(&mut self, _context: &mut PaintContext) {
            self.push("paint");
        }
        fn post_paint(&mut self) {
            self.push("post");
        }
        fn refresh(&mut self) {
            self.push("refresh");
        }
        fn pre_render(&mut self) {
            self.push("pre_render");
        }
        fn post_render(&mut self) {
            self.push("post_render");
        }
    }

    impl Drop for Recorder {
        fn drop(&mut self) {
            self.push("drop");
        }
    }

    fn tree(log: &Log) -> Control {
        let mut root = Recorder::control("root", log);
        let mut a = Recorder::control("a", log);
        a.add_child(Recorder::control("a1", log));
        root.add_child(a);
        root.add_child(Recorder::control("b", log));
        root.add_independent_child(Recorder::control("i", log));
        root
    }

    fn take(log: &Log) -> Vec<String> {
        log.borrow_mut().drain(..).collect()
    }

    #[test]
    fn update_order() {
        let log = Log::default();
        let mut root = tree(&log);
        let egui_ctx = egui::Context::default();
        let stats = FrameStats::default();
        let mut requests = OverlayRequests::default();
        let mut context = PaintContext {
            egui: &egui_ctx,
            stats: &stats,
            requests: &mut requests,
        };

        root.update(&mut context);

        assert_eq!(
            take(&log),
            vec![
                "root.pre", "root.paint", "a.pre", "b.pre", "a.paint", "b.paint", "a.post",
                "b.post", "root.post", "i.pre", "i.paint", "i.post",
            ]
        );
    }

    #[test]
    fn lifecycle_reaches_direct_children_only() {
        let log = Log::default();
        let mut root = tree(&log);

        root.initialize();
        assert_eq!(take(&log), vec!["root.init", "a.init", "b.init", "i.init"]);

        root.refresh_resources();
        assert_eq!(
            take(&log),
            vec!["root.refresh", "a.refresh", "b.refresh", "i.refresh"]
        );

        root.pre_update();
        root.post_update();
        assert_eq!(
            take(&log),
            vec![
                "root.pre_render",
                "a.pre_render",
                "b.pre_render",
                "i.pre_render",
                "root.post_render",
                "a.post_render",
                "b.post_render",
                "i.post_render",
            ]
        );
    }

    #[test]
    fn remove_and_destroy() {
        let log = Log::default();
        let mut root = tree(&log);
        let b_id = root.children()[1].id();
        let i_id = root.independent_children()[0].id();

        let b = root.remove_child(b_id).unwrap();
        assert_eq!(b.id(), b_id);
        assert!(root.remove_child(b_id).is_none());
        drop(b);
        assert_eq!(take(&log), vec!["b.drop"]);

        assert!(root.remove_child(i_id).is_none());
        assert!(root.remove_independent_child(i_id).is_some());
        take(&log);

        root.add_independent_child(Recorder::control("j", &log));
        root.destroy_children(false);
        assert!(root.children().is_empty());
        assert_eq!(root.independent_children().len(), 1);

        root.destroy_independent_children();
        assert!(root.independent_children().is_empty());
    }

    #[test]
    fn dropping_tree_drops_children_then_independent() {
        let log = Log::default();
        let root = tree(&log);
        drop(root);
        // hooks drop after the control's own drop has cleared its children
        assert_eq!(
            take(&log),
            vec!["b.drop", "a1.drop", "a.drop", "i.drop", "root.drop"]
        );
    }
}
