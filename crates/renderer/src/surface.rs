use tracing::{debug, trace};

use crate::host::GraphicsHost;
use crate::types::SurfaceDimensions;

/// Resizes the backing store to the display's current layout size.
///
/// Returns `true` only when the backing store changed. A display with no
/// area leaves the backing store untouched.
pub fn sync_to_display_size<H: GraphicsHost>(host: &mut H) -> bool {
    let (width, height) = host.display_size();
    let Some(observed) = SurfaceDimensions::new(width, height) else {
        trace!(width, height, "display has no area; keeping backing store");
        return false;
    };

    let current = host.backing_size();
    if current == observed {
        return false;
    }

    debug!(from = %current, to = %observed, "resizing backing store");
    host.set_backing_size(observed);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessHost;

    #[test]
    fn reports_each_change_once() {
        let mut host = HeadlessHost::new();
        host.set_display_size(800, 600);

        assert!(sync_to_display_size(&mut host));
        assert_eq!(host.backing_size(), SurfaceDimensions::new(800, 600).unwrap());
        assert!(!sync_to_display_size(&mut host));

        host.set_display_size(1024, 600);
        assert!(sync_to_display_size(&mut host));
        assert_eq!(host.backing_size().width(), 1024);
        assert!(!sync_to_display_size(&mut host));
    }

    #[test]
    fn matching_size_is_a_no_op() {
        let mut host = HeadlessHost::new();
        host.set_display_size(300, 150);
        assert!(!sync_to_display_size(&mut host));
        assert!(host.calls().is_empty());
    }

    #[test]
    fn hidden_display_keeps_backing_store() {
        let mut host = HeadlessHost::new();
        host.set_display_size(0, 0);
        assert!(!sync_to_display_size(&mut host));
        assert_eq!(host.backing_size(), SurfaceDimensions::new(300, 150).unwrap());
    }
}
