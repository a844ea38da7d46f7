/// Bundled PAC utility library, evaluated before every PAC script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelperLibrary {
    source: &'static str,
}

impl HelperLibrary {
    pub const VERSION: &'static str = "1";

    /// Name under which helper evaluation errors are reported.
    pub const SCRIPT_NAME: &'static str = "pac-helpers";

    pub fn bundled() -> Self {
        Self {
            source: include_str!("helpers.js"),
        }
    }

    pub fn source(&self) -> &'static str {
        self.source
    }
}

impl Default for HelperLibrary {
    fn default() -> Self {
        Self::bundled()
    }
}
