//! 8-connected component labelling of binary masks.

use super::types::{BoundingBox, FOREGROUND};
use image::GrayImage;
use std::collections::VecDeque;

/// Summary of one connected foreground component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    /// Label in [`Components::labels`], starting at 1
    pub label: u32,
    pub area: u32,
    pub bounds: BoundingBox,
    /// Whether any pixel touches the image border or the background region
    /// connected to it; components sitting in another component's hole do not
    pub external: bool,
}

/// Label image plus per-component statistics
///
/// Components are numbered in raster order of their first pixel
/// (top-to-bottom, then left-to-right). Label 0 is background.
#[derive(Debug, Clone)]
pub struct Components {
    pub width: u32,
    pub height: u32,
    pub labels: Vec<u32>,
    pub components: Vec<Component>,
}

const NEIGHBOURS_8: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

const NEIGHBOURS_4: [(i32, i32); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];

/// Label the foreground (value 255) of a mask
pub fn label(mask: &GrayImage) -> Components {
    let (width, height) = mask.dimensions();
    let (w, h) = (width as i32, height as i32);
    let src = mask.as_raw();
    let outer = outer_background(mask);

    let mut labels = vec![0u32; src.len()];
    let mut components = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..src.len() {
        if src[start] != FOREGROUND || labels[start] != 0 {
            continue;
        }
        let label = components.len() as u32 + 1;
        labels[start] = label;
        queue.push_back(start);

        let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
        let (mut max_x, mut max_y) = (0u32, 0u32);
        let mut area = 0u32;
        let mut external = false;

        while let Some(index) = queue.pop_front() {
            let x = (index % width as usize) as i32;
            let y = (index / width as usize) as i32;
            area += 1;
            min_x = min_x.min(x as u32);
            min_y = min_y.min(y as u32);
            max_x = max_x.max(x as u32);
            max_y = max_y.max(y as u32);

            if x == 0 || y == 0 || x == w - 1 || y == h - 1 {
                external = true;
            }
            if !external {
                external = NEIGHBOURS_4
                    .iter()
                    .any(|&(dx, dy)| outer[((y + dy) * w + x + dx) as usize]);
            }

            for &(dx, dy) in &NEIGHBOURS_8 {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w || ny >= h {
                    continue;
                }
                let neighbour = (ny * w + nx) as usize;
                if src[neighbour] == FOREGROUND && labels[neighbour] == 0 {
                    labels[neighbour] = label;
                    queue.push_back(neighbour);
                }
            }
        }

        components.push(Component {
            label,
            area,
            bounds: BoundingBox {
                x: min_x,
                y: min_y,
                width: max_x - min_x + 1,
                height: max_y - min_y + 1,
            },
            external,
        });
    }

    Components {
        width,
        height,
        labels,
        components,
    }
}

/// Background pixels 4-connected to the image border
///
/// 4-connected background is the dual of 8-connected foreground: any
/// background pixel not reached here lies in a hole.
fn outer_background(mask: &GrayImage) -> Vec<bool> {
    let (width, height) = mask.dimensions();
    let (w, h) = (width as i32, height as i32);
    let src = mask.as_raw();
    let mut outer = vec![false; src.len()];
    let mut queue = VecDeque::new();

    for y in 0..h {
        for x in 0..w {
            let on_border = x == 0 || y == 0 || x == w - 1 || y == h - 1;
            let index = (y * w + x) as usize;
            if on_border && src[index] != FOREGROUND {
                outer[index] = true;
                queue.push_back(index);
            }
        }
    }

    while let Some(index) = queue.pop_front() {
        let x = (index % width as usize) as i32;
        let y = (index / width as usize) as i32;
        for &(dx, dy) in &NEIGHBOURS_4 {
            let (nx, ny) = (x + dx, y + dy);
            if nx < 0 || ny < 0 || nx >= w || ny >= h {
                continue;
            }
            let neighbour = (ny * w + nx) as usize;
            if !outer[neighbour] && src[neighbour] != FOREGROUND {
                outer[neighbour] = true;
                queue.push_back(neighbour);
            }
        }
    }

    outer
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn fill(mask: &mut GrayImage, x0: u32, y0: u32, w: u32, h: u32) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                mask.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
    }

    #[test]
    fn test_diagonal_pixels_are_connected() {
        let mut mask = GrayImage::new(5, 5);
        mask.put_pixel(1, 1, Luma([FOREGROUND]));
        mask.put_pixel(2, 2, Luma([FOREGROUND]));
        mask.put_pixel(3, 3, Luma([FOREGROUND]));
        let result = label(&mask);
        assert_eq!(result.components.len(), 1);
        assert_eq!(result.components[0].area, 3);
        assert_eq!(
            result.components[0].bounds,
            BoundingBox {
                x: 1,
                y: 1,
                width: 3,
                height: 3,
            }
        );
    }

    #[test]
    fn test_raster_order_and_areas() {
        let mut mask = GrayImage::new(30, 30);
        fill(&mut mask, 20, 2, 4, 4);
        fill(&mut mask, 2, 10, 3, 5);
        let result = label(&mask);
        assert_eq!(result.components.len(), 2);
        assert_eq!(result.components[0].bounds.x, 20);
        assert_eq!(result.components[0].area, 16);
        assert_eq!(result.components[1].area, 15);
        assert_eq!(result.labels[(12 * 30 + 3) as usize], 2);
        assert_eq!(result.labels[0], 0);
    }

    #[test]
    fn test_component_inside_hole_is_not_external() {
        let mut mask = GrayImage::new(30, 30);
        fill(&mut mask, 5, 5, 20, 20);
        // Hollow out the ring interior and put an island inside
        for y in 8..22 {
            for x in 8..22 {
                mask.put_pixel(x, y, Luma([0]));
            }
        }
        fill(&mut mask, 13, 13, 4, 4);
        let result = label(&mask);
        assert_eq!(result.components.len(), 2);
        assert!(result.components[0].external);
        assert!(!result.components[1].external);
    }

    #[test]
    fn test_border_component_is_external() {
        let mut mask = GrayImage::new(10, 10);
        fill(&mut mask, 0, 0, 10, 10);
        let result = label(&mask);
        assert_eq!(result.components.len(), 1);
        assert!(result.components[0].external);
        assert_eq!(result.components[0].area, 100);
    }
}
