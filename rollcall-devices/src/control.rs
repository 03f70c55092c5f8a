use anyhow::Result;

/// The physical start/stop control.
pub trait Control {
    /// Blocks until the operator presses start.
    fn wait_for_start(&mut self) -> Result<()>;

    /// Non-blocking. Reports a press once; holding the button does not repeat it.
    fn stop_requested(&mut self) -> Result<bool>;
}

/// Two-line operator display. Fire and forget.
pub trait Feedback {
    fn show(&mut self, line1: &str, line2: &str);
}
