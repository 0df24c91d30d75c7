//! Reusable JSON-pointer builder used by the validator to report the
//! location of a failure without allocating a new string per field.

use std::fmt::Write as _;

/// Grows and shrinks in place as the validator descends into nested
/// objects and arrays. Sibling fields reuse the same backing allocation.
#[derive(Debug, Default)]
pub struct PathBuffer {
    buf: String,
}

impl PathBuffer {
    pub fn new() -> Self {
        Self { buf: String::new() }
    }

    /// Push a field name, escaped per RFC 6901 (`~` -> `~0`, `/` -> `~1`).
    /// The returned guard truncates the buffer back to its current length
    /// on drop, so callers can descend and return without bookkeeping.
    pub fn push_field<'a>(&'a mut self, name: &str) -> Segment<'a> {
        let mark = self.buf.len();
        self.buf.push('/');
        for ch in name.chars() {
            match ch {
                '~' => self.buf.push_str("~0"),
                '/' => self.buf.push_str("~1"),
                c => self.buf.push(c),
            }
        }
        Segment { buf: self, mark }
    }

    pub fn push_index<'a>(&'a mut self, index: usize) -> Segment<'a> {
        let mark = self.buf.len();
        self.buf.push('/');
        write!(self.buf, "{index}").expect("writing to String cannot fail");
        Segment { buf: self, mark }
    }

    /// Current pointer, `""` at the root per RFC 6901.
    pub fn as_str(&self) -> &str {
        &self.buf
    }
}

/// RAII guard: truncates the owning [`PathBuffer`] back to its pre-push
/// length when dropped, whatever path the caller took to get there.
pub struct Segment<'a> {
    buf: &'a mut PathBuffer,
    mark: usize,
}

impl Drop for Segment<'_> {
    fn drop(&mut self) {
        self.buf.buf.truncate(self.mark);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_pointer_is_empty_string() {
        let p = PathBuffer::new();
        assert_eq!(p.as_str(), "");
    }

    #[test]
    fn nested_field_and_index_compose() {
        let mut p = PathBuffer::new();
        {
            let _a = p.push_field("user");
            assert_eq!(p.as_str(), "/user");
            {
                let _b = p.push_field("emails");
                {
                    let _c = p.push_index(2);
                    assert_eq!(p.as_str(), "/user/emails/2");
                }
                assert_eq!(p.as_str(), "/user/emails");
            }
            assert_eq!(p.as_str(), "/user");
        }
        assert_eq!(p.as_str(), "");
    }

    #[test]
    fn escapes_tilde_and_slash() {
        let mut p = PathBuffer::new();
        let _g = p.push_field("a/b~c");
        assert_eq!(p.as_str(), "/a~1b~0c");
    }

    #[test]
    fn sibling_pushes_reuse_allocation() {
        let mut p = PathBuffer::new();
        {
            let _a = p.push_field("first_long_field_name");
        }
        let cap_after_first = p.buf.capacity();
        {
            let _b = p.push_field("b");
        }
        assert_eq!(p.buf.capacity(), cap_after_first);
    }
}
