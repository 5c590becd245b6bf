//! Front end port: turns raw script text into the committed intermediate form.

use crate::domain::source::SourceUnit;

/// A front end never fails: lines it cannot classify fall through to the body.
pub trait FrontEnd {
    fn parse(&self, source: &str) -> SourceUnit;
}
