use super::point::Label;
use super::store::AnnotationSet;

/// Marker shapes assigned to objects by their position in the set, cycling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerShape {
    Circle,
    Square,
    Triangle,
    Diamond,
}

impl MarkerShape {
    pub const PALETTE: [MarkerShape; 4] = [
        MarkerShape::Circle,
        MarkerShape::Square,
        MarkerShape::Triangle,
        MarkerShape::Diamond,
    ];

    pub fn for_object_index(index: usize) -> Self {
        Self::PALETTE[index % Self::PALETTE.len()]
    }

    /// Polygon vertices around a centre. Circles have none, draw them natively.
    pub fn outline(self, cx: f32, cy: f32, size: f32) -> Vec<(f32, f32)> {
        match self {
            MarkerShape::Circle => Vec::new(),
            MarkerShape::Square => vec![
                (cx - size, cy - size),
                (cx + size, cy - size),
                (cx + size, cy + size),
                (cx - size, cy + size),
            ],
            MarkerShape::Triangle => vec![
                (cx, cy - size),
                (cx + size, cy + size),
                (cx - size, cy + size),
            ],
            MarkerShape::Diamond => vec![
                (cx, cy - size),
                (cx + size, cy),
                (cx, cy + size),
                (cx - size, cy),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerColor {
    Green,
    Red,
}

impl From<Label> for MarkerColor {
    fn from(label: Label) -> Self {
        match label {
            Label::Positive => MarkerColor::Green,
            Label::Negative => MarkerColor::Red,
        }
    }
}

/// One point ready to draw, in display coordinates relative to the image origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub x: f32,
    pub y: f32,
    pub shape: MarkerShape,
    pub color: MarkerColor,
}

pub fn markers(set: &AnnotationSet, scale_factor: f64) -> Vec<Marker> {
    set.iter()
        .enumerate()
        .flat_map(|(index, (_, points))| {
            let shape = MarkerShape::for_object_index(index);
            points.iter().map(move |point| Marker {
                x: (f64::from(point.x) * scale_factor).trunc() as f32,
                y: (f64::from(point.y) * scale_factor).trunc() as f32,
                shape,
                color: point.label.into(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::point::Point;

    #[test]
    fn shapes_cycle_through_four() {
        assert_eq!(MarkerShape::for_object_index(0), MarkerShape::Circle);
        assert_eq!(MarkerShape::for_object_index(3), MarkerShape::Diamond);
        assert_eq!(MarkerShape::for_object_index(4), MarkerShape::Circle);
        assert_eq!(MarkerShape::for_object_index(6), MarkerShape::Triangle);
    }

    #[test]
    fn markers_scale_back_to_display_space() {
        let mut set = AnnotationSet::new();
        set.push_point("a", Point::new(100, 50, Label::Positive));
        set.push_point("b", Point::new(33, 11, Label::Negative));

        let markers = markers(&set, 0.5);
        assert_eq!(markers.len(), 2);
        assert_eq!((markers[0].x, markers[0].y), (50.0, 25.0));
        assert_eq!(markers[0].shape, MarkerShape::Circle);
        assert_eq!(markers[0].color, MarkerColor::Green);
        assert_eq!((markers[1].x, markers[1].y), (16.0, 5.0));
        assert_eq!(markers[1].shape, MarkerShape::Square);
        assert_eq!(markers[1].color, MarkerColor::Red);
    }

    #[test]
    fn polygon_outlines_surround_centre() {
        assert!(MarkerShape::Circle.outline(0.0, 0.0, 5.0).is_empty());
        assert_eq!(MarkerShape::Triangle.outline(10.0, 10.0, 5.0).len(), 3);
        assert_eq!(
            MarkerShape::Diamond.outline(10.0, 10.0, 5.0),
            vec![(10.0, 5.0), (15.0, 10.0), (10.0, 15.0), (5.0, 10.0)]
        );
    }
}
