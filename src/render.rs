use std::io::Write;
use std::thread;
use std::time::Duration;

/// Reveals text one character at a time.
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    delay: Duration,
}

impl Renderer {
    pub fn new(delay: Duration) -> Self {
        Renderer { delay }
    }

    /// Writes a blank line, then `answer` a character at a time with a flush
    /// and a pause after each, then another blank line.
    pub fn render<W: Write>(&self, out: &mut W, answer: &str) -> std::io::Result<()> {
        out.write_all(b"\n\n")?;
        out.flush()?;

        let mut utf8 = [0u8; 4];
        for c in answer.chars() {
            out.write_all(c.encode_utf8(&mut utf8).as_bytes())?;
            out.flush()?;
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
        }

        out.write_all(b"\n\n")?;
        out.flush()
    }
}
