use sprig_runtime::{Result, SprigWrite, Vm, VmSettings};
use std::{
    cell::{Ref, RefCell},
    rc::Rc,
};

/// Captures program output in a String
///
/// [SprigWrite] is implemented for OutputCapture, allowing it to be used as stdout for the
/// Sprig runtime.
#[derive(Clone, Debug, Default)]
pub struct OutputCapture {
    output: Rc<RefCell<String>>,
}

impl OutputCapture {
    /// Returns a [Vm] with `stdout` captured by an instance of [OutputCapture]
    pub fn make_vm_with_output_capture() -> (Vm, Self) {
        let output_capture = Self::default();

        let vm = Vm::with_settings(VmSettings {
            stdout: Rc::new(output_capture.clone()),
            ..Default::default()
        });

        (vm, output_capture)
    }

    /// Clears the captured output
    pub fn clear(&self) {
        self.output.borrow_mut().clear();
    }

    /// Returns the currently captured output
    pub fn captured_output(&self) -> Ref<'_, String> {
        self.output.borrow()
    }
}

impl SprigWrite for OutputCapture {
    fn write(&self, bytes: &[u8]) -> Result<()> {
        let bytes_str = match std::str::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => return Err(e.to_string().into()),
        };
        self.output.borrow_mut().push_str(bytes_str);
        Ok(())
    }

    fn write_line(&self, output: &str) -> Result<()> {
        let mut unlocked = self.output.borrow_mut();
        unlocked.push_str(output);
        unlocked.push('\n');
        Ok(())
    }
}
