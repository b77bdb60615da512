//! Geographic bounds with an explicit empty state.

use geo::{coord, Coord, Rect};

/// A geographic rectangle, or nothing at all.
///
/// Union with an empty bounds is the identity, so extents can be folded
/// without special-casing "no geometry yet".
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewportBounds(Option<Rect<f64>>);

impl ViewportBounds {
    pub const fn empty() -> Self {
        Self(None)
    }

    pub fn from_rect(rect: Rect<f64>) -> Self {
        Self(Some(rect))
    }

    /// Degenerate bounds around a single point.
    pub fn from_coord(c: Coord<f64>) -> Self {
        Self(Some(Rect::new(c, c)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn rect(&self) -> Option<Rect<f64>> {
        self.0
    }

    pub fn center(&self) -> Option<Coord<f64>> {
        self.0.map(|r| r.center())
    }

    /// Smallest bounds covering both.
    pub fn union(self, other: ViewportBounds) -> ViewportBounds {
        match (self.0, other.0) {
            (None, _) => other,
            (_, None) => self,
            (Some(a), Some(b)) => Self(Some(Rect::new(
                coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
                coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
            ))),
        }
    }

    /// Grows the bounds to include a point.
    pub fn extend(self, c: Coord<f64>) -> ViewportBounds {
        self.union(Self::from_coord(c))
    }

    /// Inclusive containment; empty bounds contain nothing.
    pub fn contains(&self, c: Coord<f64>) -> bool {
        match self.0 {
            None => false,
            Some(r) => {
                c.x >= r.min().x && c.x <= r.max().x && c.y >= r.min().y && c.y <= r.max().y
            }
        }
    }
}

impl From<Option<Rect<f64>>> for ViewportBounds {
    fn from(rect: Option<Rect<f64>>) -> Self {
        Self(rect)
    }
}

impl FromIterator<ViewportBounds> for ViewportBounds {
    fn from_iter<I: IntoIterator<Item = ViewportBounds>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::union)
    }
}

impl FromIterator<Coord<f64>> for ViewportBounds {
    fn from_iter<I: IntoIterator<Item = Coord<f64>>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::extend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_union_identity() {
        let b = ViewportBounds::from_coord(coord! { x: 1.0, y: 2.0 });
        assert_eq!(ViewportBounds::empty().union(b), b);
        assert_eq!(b.union(ViewportBounds::empty()), b);
        assert!(ViewportBounds::empty().union(ViewportBounds::empty()).is_empty());
    }

    #[test]
    fn test_union_covers_both() {
        let a = ViewportBounds::from_rect(Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 }));
        let b = ViewportBounds::from_rect(Rect::new(coord! { x: 2.0, y: -1.0 }, coord! { x: 3.0, y: 0.5 }));
        let u = a.union(b).rect().unwrap();

        assert_eq!(u.min(), coord! { x: 0.0, y: -1.0 });
        assert_eq!(u.max(), coord! { x: 3.0, y: 1.0 });
    }

    #[test]
    fn test_contains_is_inclusive() {
        let b: ViewportBounds = [coord! { x: 0.0, y: 0.0 }, coord! { x: 2.0, y: 2.0 }]
            .into_iter()
            .collect();
        assert!(b.contains(coord! { x: 2.0, y: 0.0 }));
        assert!(b.contains(coord! { x: 1.0, y: 1.0 }));
        assert!(!b.contains(coord! { x: 2.1, y: 1.0 }));
        assert!(!ViewportBounds::empty().contains(coord! { x: 0.0, y: 0.0 }));
    }

    #[test]
    fn test_collect_of_nothing_is_empty() {
        let b: ViewportBounds = Vec::<ViewportBounds>::new().into_iter().collect();
        assert!(b.is_empty());
        assert_eq!(b.center(), None);
    }
}
