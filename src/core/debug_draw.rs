use bevy::{
    color::LinearRgba,
    gizmos::gizmos::Gizmos,
    math::{Isometry3d, Vec3},
    reflect::Reflect,
    transform::prelude::Transform,
};

/// Deferred debug-draw command buffer.
///
/// Graph evaluation runs outside of any render access, so nodes queue commands
/// here and a system applies them to [`Gizmos`] at the end of the frame.
/// Purely observational; has no effect on simulation results.
#[derive(Reflect, Clone, Default)]
pub struct DeferredGizmos {
    commands: Vec<DeferredGizmoCommand>,
}

#[derive(Reflect, Clone)]
pub enum DeferredGizmoCommand {
    Line(Vec3, Vec3, LinearRgba),
    Sphere(Vec3, f32, LinearRgba),
    Axes(Transform, f32),
}

impl DeferredGizmos {
    pub fn apply(&mut self, gizmos: &mut Gizmos) {
        for command in self.commands.drain(..) {
            command.apply(gizmos);
        }
    }

    pub fn queue(&mut self, command: DeferredGizmoCommand) {
        self.commands.push(command);
    }

    pub fn line(&mut self, start: Vec3, end: Vec3, color: LinearRgba) {
        self.commands
            .push(DeferredGizmoCommand::Line(start, end, color));
    }

    pub fn sphere(&mut self, position: Vec3, radius: f32, color: LinearRgba) {
        self.commands
            .push(DeferredGizmoCommand::Sphere(position, radius, color));
    }

    pub fn axes(&mut self, transform: Transform, base_length: f32) {
        self.commands
            .push(DeferredGizmoCommand::Axes(transform, base_length));
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }
}

impl DeferredGizmoCommand {
    pub fn apply(self, gizmos: &mut Gizmos) {
        match self {
            DeferredGizmoCommand::Line(start, end, color) => {
                gizmos.line(start, end, color);
            }
            DeferredGizmoCommand::Sphere(position, radius, color) => {
                gizmos.sphere(Isometry3d::from_translation(position), radius, color);
            }
            DeferredGizmoCommand::Axes(transform, base_length) => {
                gizmos.axes(transform, base_length);
            }
        }
    }
}
