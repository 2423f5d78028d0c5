//! Interaction state machines driven by recognition output.
//!
//! Mode switching, fingerspelled word building, and the touchless
//! pointer.  Each owns its timers through `TimerSlot`.

pub mod mode;
pub mod pointer;
pub mod timer;
pub mod word;

pub use mode::{
    ClassifierSwitchPolicy, InteractionMode, ModeConfig, ModeEvent, ModeHold, ModeStateMachine,
    SwitchSource,
};
pub use pointer::{CursorState, PointerConfig, PointerEvent, PointerNavigator, UiTarget};
pub use timer::{TimerHandle, TimerSlot};
pub use word::{
    letter_from_label, LetterStreak, WordBuilder, WordConfig, WordEvent, WordNotice, WordState,
};
