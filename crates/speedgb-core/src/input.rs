use bitflags::bitflags;

bitflags! {
    /// Pressed buttons. A set bit means the button is held down.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash)]
    pub struct Buttons: u8 {
        const A = 0x01;
        const B = 0x02;
        const SELECT = 0x04;
        const START = 0x08;
        const RIGHT = 0x10;
        const LEFT = 0x20;
        const UP = 0x40;
        const DOWN = 0x80;
    }
}

impl Buttons {
    /// Parse a button by its lowercase name (`"a"`, `"start"`, `"up"`, ...).
    pub fn parse_name(name: &str) -> Option<Self> {
        let button = match name.trim().to_ascii_lowercase().as_str() {
            "a" => Buttons::A,
            "b" => Buttons::B,
            "select" => Buttons::SELECT,
            "start" => Buttons::START,
            "right" => Buttons::RIGHT,
            "left" => Buttons::LEFT,
            "up" => Buttons::UP,
            "down" => Buttons::DOWN,
            _ => return None,
        };
        Some(button)
    }
}

/// Pull-based input source.
///
/// The session calls [`InputGetter::buttons`] from inside
/// [`Session::run_for`](crate::Session::run_for), on the calling thread, once
/// per emulated input latch point (the start of every frame's VBlank).
/// Implementations should return promptly with the host's current state.
pub trait InputGetter {
    fn buttons(&mut self) -> Buttons;
}

impl<F> InputGetter for F
where
    F: FnMut() -> Buttons,
{
    fn buttons(&mut self) -> Buttons {
        self()
    }
}
