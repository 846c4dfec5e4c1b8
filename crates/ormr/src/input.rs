//! Window and device events routed to systems.
//!
//! The host translates whatever its windowing layer reports into
//! [`InputEvent`]s and hands them to
//! [`World::process_event`](crate::ecs::World::process_event), which forwards
//! each one to every system in registration order.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Host-supplied key code.
pub type KeyCode = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other(u16),
}

/// One input event from the host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    KeyPressed(KeyCode),
    KeyReleased(KeyCode),
    MouseMoved(Vec2),
    MouseButtonPressed { button: MouseButton, position: Vec2 },
    MouseButtonReleased { button: MouseButton, position: Vec2 },
    Resized { width: u32, height: u32 },
    Closed,
}

impl InputEvent {
    /// Cursor position carried by mouse events.
    pub fn position(&self) -> Option<Vec2> {
        match *self {
            Self::MouseMoved(position)
            | Self::MouseButtonPressed { position, .. }
            | Self::MouseButtonReleased { position, .. } => Some(position),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mouse_events_carry_position() {
        let event = InputEvent::MouseButtonPressed {
            button: MouseButton::Left,
            position: Vec2::new(3.0, 4.0),
        };
        assert_eq!(event.position(), Some(Vec2::new(3.0, 4.0)));
        assert_eq!(InputEvent::KeyPressed(13).position(), None);
    }

    #[test]
    fn events_serialize_to_json() {
        let json = serde_json::to_string(&InputEvent::Resized { width: 800, height: 600 }).unwrap();
        assert_eq!(json, r#"{"Resized":{"width":800,"height":600}}"#);
    }
}
