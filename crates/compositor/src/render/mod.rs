//! Render pass engine
//!
//! A pass runs in two phases over a front-to-back list of render
//! instances:
//!
//! 1. Gathering: each instance clips the remaining damage to its extents,
//!    records an instruction, and may remove the area it covers opaquely so
//!    instances further back see less damage.
//! 2. Execution: instructions run in reverse (back to front), so the
//!    painter's algorithm composes correctly.
//!
//! Coordinates handed to a [`Renderer`] are always in layout space;
//! instances under transformers reach layout space through the mapping
//! chain carried by their [`RenderTarget`].

pub mod damage_ring;
pub mod software;
pub mod swapchain;

use std::rc::Rc;

use smithay::utils::Transform;

use crate::buffer::{Buffer, Color};
use crate::geometry::{Point, Rect};
use crate::region::Region;
use crate::scene::{DirectScanout, RenderInstance, SceneGraph, TransformerStack};

pub use damage_ring::DamageRing;
pub use software::{DrawCall, Framebuffer, RecordingRenderer, SoftwareRenderer};
pub use swapchain::Swapchain;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("no free buffer in the swapchain")]
    BufferAcquire,
    #[error("output is disabled")]
    OutputDisabled,
}

/// One transformer hop from a node's content space to its parent's
/// render space
#[derive(Debug, Clone)]
pub struct RenderMapping {
    pub stack: TransformerStack,
    /// Extents of the transformed content, the pivot of the stack
    pub content: Rect,
    /// Translation from the transformer node into the outer render space
    pub offset: Point,
}

impl RenderMapping {
    pub fn apply(&self, r: &Rect) -> Rect {
        self.stack.map_box(&self.content, r).translated(self.offset)
    }
}

/// Where and how an instruction draws
#[derive(Debug, Clone)]
pub struct RenderTarget {
    /// Layout rectangle covered by the framebuffer
    pub geometry: Rect,
    pub scale: f64,
    pub transform: Transform,
    /// Innermost mapping last
    mappings: Vec<RenderMapping>,
    /// Layout-space clip inherited from enclosing instructions
    clip: Option<Region>,
}

impl RenderTarget {
    pub fn new(geometry: Rect, scale: f64, transform: Transform) -> Self {
        Self {
            geometry,
            scale,
            transform,
            mappings: Vec::new(),
            clip: None,
        }
    }

    pub fn is_nested(&self) -> bool {
        !self.mappings.is_empty()
    }

    /// Map a render-space rectangle to layout space
    pub fn to_layout(&self, r: &Rect) -> Rect {
        self.mappings.iter().rev().fold(*r, |acc, m| m.apply(&acc))
    }

    /// Map a render-space region to layout space and apply the inherited
    /// clip
    pub fn clip_to_layout(&self, region: &Region) -> Region {
        let mapped = if self.mappings.is_empty() {
            region.clone()
        } else {
            region.iter().map(|r| self.to_layout(r)).collect()
        };
        match &self.clip {
            Some(clip) => mapped.intersect(clip),
            None => mapped,
        }
    }

    /// Product of the alpha of every mapping
    pub fn alpha(&self) -> f32 {
        self.mappings.iter().map(|m| m.stack.alpha()).product()
    }

    /// Target for content drawn through `mapping`, clipped to `region`
    /// (given in this target's render space)
    pub fn nested(&self, mapping: RenderMapping, region: &Region) -> RenderTarget {
        let clip = self.clip_to_layout(region);
        let mut mappings = self.mappings.clone();
        mappings.push(mapping);
        RenderTarget {
            geometry: self.geometry,
            scale: self.scale,
            transform: self.transform,
            mappings,
            clip: Some(clip),
        }
    }
}

/// Drawing backend. All rectangles are in layout space.
pub trait Renderer {
    fn clear(&mut self, target: &RenderTarget, region: &Region, color: Color);
    fn draw_buffer(&mut self, target: &RenderTarget, buffer: &Buffer, dst: Rect, clip: &Region, alpha: f32);
    fn draw_solid(&mut self, target: &RenderTarget, dst: Rect, clip: &Region, color: Color);
}

/// Output-side contract for direct scanout
pub trait ScanoutOutput {
    fn layout_geometry(&self) -> Rect;
    fn scale(&self) -> f64;
    fn transform(&self) -> Transform;
    /// Present `buffer` without compositing. False if the backend refused.
    fn scanout(&mut self, buffer: &Rc<Buffer>) -> bool;
}

/// An instruction recorded while gathering
#[derive(Debug, Clone)]
pub struct RenderInstruction {
    /// Index of the instance in the list being gathered
    pub instance: usize,
    pub target: RenderTarget,
    pub damage: Region,
}

/// Instructions gathered in front-to-back order
#[derive(Debug, Default)]
pub struct InstructionList {
    current: usize,
    instructions: Vec<RenderInstruction>,
}

impl InstructionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an instruction for the instance currently being scheduled
    pub fn push(&mut self, target: &RenderTarget, damage: Region) {
        self.instructions.push(RenderInstruction {
            instance: self.current,
            target: target.clone(),
            damage,
        });
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RenderInstruction> {
        self.instructions.iter()
    }
}

/// Gather instructions from `instances`, front to back, shrinking `damage`
pub fn schedule_from_list(
    instances: &mut [Box<dyn RenderInstance>],
    scene: &SceneGraph,
    target: &RenderTarget,
    damage: &mut Region,
    list: &mut InstructionList,
) {
    for (index, instance) in instances.iter_mut().enumerate() {
        if damage.is_empty() {
            break;
        }
        list.current = index;
        instance.schedule_instructions(scene, target, damage, list);
    }
}

/// Execute gathered instructions back to front
pub fn execute_instructions(
    instances: &mut [Box<dyn RenderInstance>],
    list: InstructionList,
    scene: &SceneGraph,
    renderer: &mut dyn Renderer,
) {
    for instruction in list.instructions.into_iter().rev() {
        if let Some(instance) = instances.get_mut(instruction.instance) {
            instance.render(scene, &instruction.target, &instruction.damage, renderer);
        }
    }
}

/// Full pass: gather, clear what no instance claimed, then execute
pub fn run_render_pass(
    instances: &mut [Box<dyn RenderInstance>],
    scene: &SceneGraph,
    target: &RenderTarget,
    damage: &Region,
    background: Color,
    renderer: &mut dyn Renderer,
) -> usize {
    let mut remaining = damage.clone();
    let mut list = InstructionList::new();
    schedule_from_list(instances, scene, target, &mut remaining, &mut list);
    if !remaining.is_empty() {
        renderer.clear(target, &remaining, background);
    }
    let count = list.len();
    tracing::trace!(target: "wayscene::render", instructions = count, "executing render pass");
    execute_instructions(instances, list, scene, renderer);
    count
}

/// Ask each instance, front first, to scan out directly. The first answer
/// other than [`DirectScanout::Skip`] decides.
pub fn try_scanout_from_list(
    instances: &mut [Box<dyn RenderInstance>],
    scene: &SceneGraph,
    output: &mut dyn ScanoutOutput,
) -> bool {
    for instance in instances.iter_mut() {
        match instance.try_scanout(scene, output) {
            DirectScanout::Success => return true,
            DirectScanout::Occlusion => return false,
            DirectScanout::Skip => {}
        }
    }
    false
}

/// Propagate visibility front to back
pub fn compute_visibility_from_list(
    instances: &mut [Box<dyn RenderInstance>],
    scene: &SceneGraph,
    visible: &mut Region,
) {
    for instance in instances.iter_mut() {
        instance.compute_visibility(scene, visible);
    }
}
