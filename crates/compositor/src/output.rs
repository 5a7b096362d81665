//! Outputs, the output layout and per-output render managers
//!
//! # Responsibilities
//!
//! - Output placement in layout space
//! - Per-output frame bookkeeping: effect hooks, redraw-always and inhibit
//!   counters, damage ring, swapchain, cached render instances
//! - The scanout plane the direct scanout path presents to
//!
//! # NOT Responsible For
//!
//! - Running a frame (see `state/paint.rs`, which needs plugins and
//!   animation hooks)

use std::rc::Rc;

use serde::Serialize;
use smithay::utils::Transform;

use crate::arena::Arena;
use crate::buffer::{Buffer, BufferId};
use crate::geometry::{Point, Rect, Size};
use crate::plugin::PluginId;
use crate::region::Region;
use crate::render::{DamageRing, ScanoutOutput, Swapchain};
use crate::scene::RenderInstance;
use crate::view::ViewId;

crate::arena_id!(
    /// Handle to an output
    OutputId,
    "output"
);

/// When an effect hook runs relative to compositing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EffectPhase {
    /// Before anything else; may damage and move things
    Pre,
    /// After `Pre`, for hooks that only add damage
    Damage,
    /// After the scene is painted, drawing on top of it
    Overlay,
    /// After the frame is presented
    Post,
}

impl EffectPhase {
    pub const ALL: [EffectPhase; 4] = [
        EffectPhase::Pre,
        EffectPhase::Damage,
        EffectPhase::Overlay,
        EffectPhase::Post,
    ];

    fn slot(self) -> usize {
        match self {
            EffectPhase::Pre => 0,
            EffectPhase::Damage => 1,
            EffectPhase::Overlay => 2,
            EffectPhase::Post => 3,
        }
    }
}

/// Callback registered with an output's render loop
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EffectHook {
    /// Frame step of the animation hook `key` on `view`
    Animation { view: ViewId, key: String },
    /// `Plugin::run_effect` with a plugin-chosen token
    Plugin { plugin: PluginId, token: u32 },
}

/// A plugin holding an output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginGrab {
    pub plugin: PluginId,
    pub priority: i32,
}

/// What happened when an output was asked to paint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Nothing needed repainting
    Skipped,
    /// A client buffer was presented directly
    ScannedOut,
    /// The scene was composited and presented
    Painted,
    /// No buffer could be acquired; damage is kept for the next frame
    AcquireFailed,
    Disabled,
}

/// Plane that receives directly scanned out buffers
#[derive(Debug, Clone)]
pub struct ScanoutPlane {
    geometry: Rect,
    scale: f64,
    transform: Transform,
    /// Whether the backend accepts direct scanout at all
    pub backend_allows: bool,
    presented: Option<Rc<Buffer>>,
}

impl ScanoutPlane {
    pub fn presented(&self) -> Option<BufferId> {
        self.presented.as_ref().map(|b| b.id)
    }

    pub fn clear(&mut self) {
        self.presented = None;
    }
}

impl ScanoutOutput for ScanoutPlane {
    fn layout_geometry(&self) -> Rect {
        self.geometry
    }

    fn scale(&self) -> f64 {
        self.scale
    }

    fn transform(&self) -> Transform {
        self.transform
    }

    fn scanout(&mut self, buffer: &Rc<Buffer>) -> bool {
        if !self.backend_allows {
            return false;
        }
        self.presented = Some(Rc::clone(buffer));
        true
    }
}

/// Per-output frame state
pub struct RenderManager {
    effects: [Vec<EffectHook>; 4],
    redraw_always: i32,
    inhibit: i32,
    force_next_frame: bool,
    pub(crate) damage_ring: DamageRing,
    pub(crate) swapchain: Swapchain,
    pub(crate) instances: Vec<Box<dyn RenderInstance>>,
    pub(crate) instances_dirty: bool,
    pub(crate) visibility_dirty: bool,
    /// Swapchain buffers are stale after direct scanout
    full_repaint: bool,
    frames: u64,
}

impl RenderManager {
    fn new(geometry: Rect, scale: f64) -> Self {
        let physical = geometry.scaled(scale).size();
        Self {
            effects: Default::default(),
            redraw_always: 0,
            inhibit: 0,
            force_next_frame: true,
            damage_ring: DamageRing::new(geometry),
            swapchain: Swapchain::new(physical, 2),
            instances: Vec::new(),
            instances_dirty: true,
            visibility_dirty: true,
            full_repaint: false,
            frames: 0,
        }
    }

    // ========== Effect hooks ==========

    pub fn add_effect(&mut self, hook: EffectHook, phase: EffectPhase) {
        let list = &mut self.effects[phase.slot()];
        if !list.contains(&hook) {
            list.push(hook);
        }
    }

    /// Remove a hook from every phase
    pub fn rem_effect(&mut self, hook: &EffectHook) {
        for list in &mut self.effects {
            list.retain(|h| h != hook);
        }
    }

    /// Drop every hook for which `keep` is false
    pub(crate) fn retain_effects(&mut self, mut keep: impl FnMut(&EffectHook) -> bool) {
        for list in &mut self.effects {
            list.retain(&mut keep);
        }
    }

    pub fn has_effect(&self, hook: &EffectHook) -> bool {
        self.effects.iter().any(|list| list.contains(hook))
    }

    /// Snapshot of the hooks in a phase; hooks may add or remove hooks
    /// while the snapshot is being run
    pub fn effects(&self, phase: EffectPhase) -> Vec<EffectHook> {
        self.effects[phase.slot()].clone()
    }

    /// Overlay and post effects need the composited frame
    pub fn can_scanout(&self) -> bool {
        self.inhibit <= 0
            && self.effects[EffectPhase::Overlay.slot()].is_empty()
            && self.effects[EffectPhase::Post.slot()].is_empty()
    }

    // ========== Counters ==========

    /// Take or release a request to repaint every frame
    pub fn set_redraw_always(&mut self, always: bool) {
        self.redraw_always += if always { 1 } else { -1 };
        if self.redraw_always < 0 {
            tracing::error!(target: "wayscene::render", "redraw_always counter went negative");
            self.redraw_always = 0;
        }
        if self.redraw_always > 0 {
            self.schedule_repaint();
        }
    }

    pub fn redraw_always(&self) -> bool {
        self.redraw_always > 0
    }

    pub(crate) fn add_inhibit(&mut self, add: bool) {
        self.inhibit += if add { 1 } else { -1 };
        if self.inhibit < 0 {
            tracing::error!(target: "wayscene::render", "inhibit counter went negative");
            self.inhibit = 0;
        }
        self.damage_whole();
    }

    pub fn is_inhibited(&self) -> bool {
        self.inhibit > 0
    }

    // ========== Damage and scheduling ==========

    pub fn damage(&mut self, region: &Region) {
        if self.damage_ring.add(region) {
            self.force_next_frame = true;
        }
    }

    pub fn damage_whole(&mut self) {
        self.damage_ring.add_whole();
        self.force_next_frame = true;
    }

    pub fn schedule_repaint(&mut self) {
        self.force_next_frame = true;
    }

    /// Whether the next frame has anything to do
    pub fn needs_frame(&self) -> bool {
        self.force_next_frame || !self.damage_ring.is_empty() || self.redraw_always()
    }

    pub(crate) fn frame_done(&mut self) {
        self.force_next_frame = false;
        self.frames += 1;
    }

    /// A client buffer was presented instead of a composited frame
    pub(crate) fn scanout_done(&mut self) {
        self.damage_ring.discard_current();
        self.full_repaint = true;
        self.frame_done();
    }

    /// Damage to repaint into a buffer of age `age`
    pub(crate) fn frame_damage(&mut self, age: u32) -> Region {
        if std::mem::take(&mut self.full_repaint) {
            return Region::from_rect(self.damage_ring.bounds());
        }
        self.damage_ring.buffer_damage(age)
    }

    /// Damage accumulated for the next frame
    pub fn pending_damage(&self) -> &Region {
        self.damage_ring.current()
    }

    pub fn frames_painted(&self) -> u64 {
        self.frames
    }

    pub fn mark_instances_dirty(&mut self) {
        self.instances_dirty = true;
        self.visibility_dirty = true;
    }

    pub fn mark_visibility_dirty(&mut self) {
        self.visibility_dirty = true;
    }

    pub fn swapchain_mut(&mut self) -> &mut Swapchain {
        &mut self.swapchain
    }

    pub fn front_buffer(&self) -> Option<&crate::render::Framebuffer> {
        self.swapchain.front()
    }
}

pub struct Output {
    pub id: OutputId,
    pub name: String,
    geometry: Rect,
    scale: f64,
    transform: Transform,
    pub enabled: bool,
    pub render: RenderManager,
    pub scanout_plane: ScanoutPlane,
    pub(crate) grab: Option<PluginGrab>,
}

impl Output {
    pub fn geometry(&self) -> Rect {
        self.geometry
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    /// Size of the framebuffer in pixels
    pub fn physical_size(&self) -> Size {
        self.geometry.scaled(self.scale).size()
    }

    pub fn active_grab(&self) -> Option<PluginGrab> {
        self.grab
    }

    fn reconfigure(&mut self, geometry: Rect, scale: f64) {
        self.geometry = geometry;
        self.scale = scale;
        self.scanout_plane.geometry = geometry;
        self.scanout_plane.scale = scale;
        self.render.damage_ring.set_bounds(geometry);
        self.render.swapchain.resize(geometry.scaled(scale).size());
        self.render.mark_instances_dirty();
        self.render.damage_whole();
    }
}

/// All outputs and their placement in layout space
#[derive(Default)]
pub struct OutputLayout {
    outputs: Arena<OutputId, Output>,
}

impl OutputLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_output(&mut self, name: &str, geometry: Rect, scale: f64) -> OutputId {
        self.outputs.insert_with(|id| Output {
            id,
            name: name.to_string(),
            geometry,
            scale,
            transform: Transform::Normal,
            enabled: true,
            render: RenderManager::new(geometry, scale),
            scanout_plane: ScanoutPlane {
                geometry,
                scale,
                transform: Transform::Normal,
                backend_allows: true,
                presented: None,
            },
            grab: None,
        })
    }

    pub fn remove_output(&mut self, id: OutputId) -> Option<Output> {
        self.outputs.remove(id)
    }

    pub fn get(&self, id: OutputId) -> Option<&Output> {
        self.outputs.get(id)
    }

    pub fn get_mut(&mut self, id: OutputId) -> Option<&mut Output> {
        self.outputs.get_mut(id)
    }

    pub fn ids(&self) -> Vec<OutputId> {
        self.outputs.ids()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Output> {
        self.outputs.iter().map(|(_, o)| o)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Output> {
        self.outputs.iter_mut().map(|(_, o)| o)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Move or rescale an output
    pub fn configure(&mut self, id: OutputId, geometry: Rect, scale: f64) -> bool {
        match self.outputs.get_mut(id) {
            Some(output) => {
                output.reconfigure(geometry, scale);
                true
            }
            None => false,
        }
    }

    pub fn set_transform(&mut self, id: OutputId, transform: Transform) {
        if let Some(output) = self.outputs.get_mut(id) {
            output.transform = transform;
            output.scanout_plane.transform = transform;
            output.render.damage_whole();
        }
    }

    /// Output containing the point, if any
    pub fn output_at(&self, p: Point) -> Option<OutputId> {
        self.iter()
            .find(|o| o.enabled && o.geometry.contains_point(p))
            .map(|o| o.id)
    }

    /// Output with the largest overlap with `rect`
    pub fn output_for_rect(&self, rect: &Rect) -> Option<OutputId> {
        self.iter()
            .filter(|o| o.enabled)
            .filter_map(|o| o.geometry.intersection(rect).map(|i| (o.id, i.area())))
            .max_by_key(|&(_, area)| area)
            .map(|(id, _)| id)
    }

    /// Route layout-space damage to every output it touches
    pub fn damage(&mut self, region: &Region) {
        if region.is_empty() {
            return;
        }
        for output in self.iter_mut() {
            if region.overlaps_rect(&output.geometry) {
                output.render.damage(region);
            }
        }
    }

    pub fn damage_whole(&mut self) {
        for output in self.iter_mut() {
            output.render.damage_whole();
        }
    }
}
