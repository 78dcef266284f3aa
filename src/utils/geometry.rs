use std::{
    fmt,
    marker::PhantomData,
    ops::{Add, Sub},
};

/// Type-level marker for the coordinate space of the root window, in pixels
#[derive(Debug)]
pub struct Logical;

/// Numeric types usable as coordinates
pub trait Coordinate: Copy + PartialOrd + Default + fmt::Debug + Add<Output = Self> + Sub<Output = Self> {
    /// Converts the coordinate to a f64
    fn to_f64(self) -> f64;

    /// The smaller of two coordinates
    fn min(self, other: Self) -> Self {
        if other < self {
            other
        } else {
            self
        }
    }

    /// The larger of two coordinates
    fn max(self, other: Self) -> Self {
        if other > self {
            other
        } else {
            self
        }
    }
}

macro_rules! coordinate_impl {
    ($($ty:ty),*) => {
        $(
            impl Coordinate for $ty {
                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

coordinate_impl!(i16, u16, i32, u32, f64);

/// Implements the traits shared by two-component geometry types.
///
/// The impls are written out instead of derived, so they do not require anything of the `Kind`
/// marker.
macro_rules! pair_impl {
    ($name:ident, $a:ident, $b:ident) => {
        impl<N: Coordinate, Kind> $name<N, Kind> {
            /// Converts the underlying numerical type to f64
            #[inline]
            pub fn to_f64(self) -> $name<f64, Kind> {
                $name::from((self.$a.to_f64(), self.$b.to_f64()))
            }
        }

        impl<N, Kind> From<(N, N)> for $name<N, Kind> {
            #[inline]
            fn from(($a, $b): (N, N)) -> Self {
                $name {
                    $a,
                    $b,
                    _kind: PhantomData,
                }
            }
        }

        impl<N, Kind> From<$name<N, Kind>> for (N, N) {
            #[inline]
            fn from(value: $name<N, Kind>) -> (N, N) {
                (value.$a, value.$b)
            }
        }

        impl<N: fmt::Debug, Kind> fmt::Debug for $name<N, Kind> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field(stringify!($a), &self.$a)
                    .field(stringify!($b), &self.$b)
                    .finish()
            }
        }

        impl<N: Clone, Kind> Clone for $name<N, Kind> {
            #[inline]
            fn clone(&self) -> Self {
                $name::from((self.$a.clone(), self.$b.clone()))
            }
        }

        impl<N: Copy, Kind> Copy for $name<N, Kind> {}

        impl<N: PartialEq, Kind> PartialEq for $name<N, Kind> {
            fn eq(&self, other: &Self) -> bool {
                self.$a == other.$a && self.$b == other.$b
            }
        }

        impl<N: Eq, Kind> Eq for $name<N, Kind> {}

        impl<N: Default, Kind> Default for $name<N, Kind> {
            fn default() -> Self {
                $name::from((N::default(), N::default()))
            }
        }
    };
}

/// A point as defined by its x and y coordinates
pub struct Point<N, Kind> {
    /// horizontal coordinate
    pub x: N,
    /// vertical coordinate
    pub y: N,
    _kind: PhantomData<Kind>,
}

pair_impl!(Point, x, y);

impl<N: Coordinate, Kind> Add for Point<N, Kind> {
    type Output = Point<N, Kind>;
    #[inline]
    fn add(self, other: Point<N, Kind>) -> Point<N, Kind> {
        Point::from((self.x + other.x, self.y + other.y))
    }
}

impl<N: Coordinate, Kind> Sub for Point<N, Kind> {
    type Output = Point<N, Kind>;
    #[inline]
    fn sub(self, other: Point<N, Kind>) -> Point<N, Kind> {
        Point::from((self.x - other.x, self.y - other.y))
    }
}

impl<Kind> Point<i32, Kind> {
    /// Clamps both coordinates into the 16 bit range of the X11 wire format
    pub fn clamp_to_i16(self) -> Point<i16, Kind> {
        let clamp = |value: i32| value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
        Point::from((clamp(self.x), clamp(self.y)))
    }
}

/// A size as defined by its width and height
pub struct Size<N, Kind> {
    /// width
    pub w: N,
    /// height
    pub h: N,
    _kind: PhantomData<Kind>,
}

pair_impl!(Size, w, h);

/// A rectangle defined by its top-left corner and dimensions
pub struct Rectangle<N, Kind> {
    /// Location of the top-left corner of the rectangle
    pub loc: Point<N, Kind>,
    /// Size of the rectangle, as (width, height)
    pub size: Size<N, Kind>,
}

impl<N: Coordinate, Kind> Rectangle<N, Kind> {
    /// Creates a rectangle from its top-left corner and its dimensions
    #[inline]
    pub fn new(loc: impl Into<Point<N, Kind>>, size: impl Into<Size<N, Kind>>) -> Self {
        Rectangle {
            loc: loc.into(),
            size: size.into(),
        }
    }

    /// The corner opposite to `loc`, exclusive
    #[inline]
    fn end(&self) -> Point<N, Kind> {
        Point::from((self.loc.x + self.size.w, self.loc.y + self.size.h))
    }

    /// Whether `point` lies inside, counting the top and left edges only
    pub fn contains(self, point: impl Into<Point<N, Kind>>) -> bool {
        let point = point.into();
        let end = self.end();
        point.x >= self.loc.x && point.y >= self.loc.y && point.x < end.x && point.y < end.y
    }

    /// The area covered by both rectangles, `None` if they do not overlap
    pub fn intersection(self, other: impl Into<Rectangle<N, Kind>>) -> Option<Self> {
        let other = other.into();
        let (end, other_end) = (self.end(), other.end());
        let start = Point::<N, Kind>::from((self.loc.x.max(other.loc.x), self.loc.y.max(other.loc.y)));
        let stop = Point::<N, Kind>::from((end.x.min(other_end.x), end.y.min(other_end.y)));

        if stop.x <= start.x || stop.y <= start.y {
            return None;
        }
        Some(Rectangle::new(start, (stop.x - start.x, stop.y - start.y)))
    }
}

impl<N: fmt::Debug, Kind> fmt::Debug for Rectangle<N, Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rectangle {{ {:?}x{:?} at ({:?}, {:?}) }}",
            self.size.w, self.size.h, self.loc.x, self.loc.y
        )
    }
}

impl<N: Clone, Kind> Clone for Rectangle<N, Kind> {
    #[inline]
    fn clone(&self) -> Self {
        Rectangle {
            loc: self.loc.clone(),
            size: self.size.clone(),
        }
    }
}

impl<N: Copy, Kind> Copy for Rectangle<N, Kind> {}

impl<N: PartialEq, Kind> PartialEq for Rectangle<N, Kind> {
    fn eq(&self, other: &Self) -> bool {
        self.loc == other.loc && self.size == other.size
    }
}

impl<N: Eq, Kind> Eq for Rectangle<N, Kind> {}

impl<N: Default, Kind> Default for Rectangle<N, Kind> {
    fn default() -> Self {
        Rectangle {
            loc: Point::default(),
            size: Size::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Logical, Point, Rectangle};

    #[test]
    fn rectangle_intersection() {
        let a = Rectangle::<i32, Logical>::new((0, 0), (100, 100));
        let b = Rectangle::<i32, Logical>::new((50, 20), (100, 100));
        assert_eq!(a.intersection(b), Some(Rectangle::new((50, 20), (50, 80))));
    }

    #[test]
    fn disjoint_rectangles_do_not_intersect() {
        let a = Rectangle::<i32, Logical>::new((0, 0), (10, 10));
        let b = Rectangle::<i32, Logical>::new((10, 0), (10, 10));
        assert_eq!(a.intersection(b), None);
    }

    #[test]
    fn rectangle_contains_is_half_open() {
        let a = Rectangle::<i32, Logical>::new((0, 0), (10, 10));
        assert!(a.contains((0, 0)));
        assert!(a.contains((9, 9)));
        assert!(!a.contains((10, 5)));
    }

    #[test]
    fn point_arithmetic() {
        let a = Point::<i32, Logical>::from((3, 4));
        let b = Point::<i32, Logical>::from((1, 6));
        assert_eq!(a + b, (4, 10).into());
        assert_eq!((a - b).to_f64(), (2.0, -2.0).into());
    }

    #[test]
    fn wire_coordinates_saturate() {
        let inside = Point::<i32, Logical>::from((-20, 300));
        assert_eq!(inside.clamp_to_i16(), (-20i16, 300i16).into());

        let outside = Point::<i32, Logical>::from((40_000, -40_000));
        assert_eq!(outside.clamp_to_i16(), (i16::MAX, i16::MIN).into());
    }
}
