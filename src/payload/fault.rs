/// Injected detector fault flag.
///
/// Independent of the power state: a fault set while the payload is off is
/// only visible once the payload is stepped while powered.
#[derive(Debug, Default)]
pub struct FaultController {
    present: bool,
}

impl FaultController {
    pub fn new() -> Self {
        Self { present: false }
    }

    pub fn set_fault(&mut self) {
        self.present = true;
    }

    pub fn clear_fault(&mut self) {
        self.present = false;
    }

    pub fn is_present(&self) -> bool {
        self.present
    }
}
