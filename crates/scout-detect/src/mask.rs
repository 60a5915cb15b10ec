use image::GrayImage;
use scout_types::Rect;

/// 前景差异图按百分比阈值二值化（0 或 255）
pub fn threshold(diff: &GrayImage, threshold_percent: i32) -> GrayImage {
    let cutoff = (255 * threshold_percent.clamp(0, 100) / 100) as u8;
    let mut mask = GrayImage::new(diff.width(), diff.height());
    for (x, y, pixel) in diff.enumerate_pixels() {
        if pixel[0] > cutoff {
            mask.put_pixel(x, y, image::Luma([255]));
        }
    }
    mask
}

/// 3×3 膨胀
pub fn dilate3x3(mask: &GrayImage) -> GrayImage {
    let (width, height) = mask.dimensions();
    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let mut hit = false;
            'probe: for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    let nx = x as i32 + dx;
                    let ny = y as i32 + dy;
                    if nx >= 0
                        && ny >= 0
                        && (nx as u32) < width
                        && (ny as u32) < height
                        && mask.get_pixel(nx as u32, ny as u32)[0] > 0
                    {
                        hit = true;
                        break 'probe;
                    }
                }
            }
            if hit {
                out.put_pixel(x, y, image::Luma([255]));
            }
        }
    }
    out
}

/// 一个连通域：外接矩形 + 像素面积
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub rect: Rect,
    pub area: i64,
}

/// 8 连通域提取
pub fn find_regions(mask: &GrayImage) -> Vec<Region> {
    let (width, height) = mask.dimensions();
    let mut visited = vec![false; (width * height) as usize];
    let mut regions = Vec::new();
    let index = |x: u32, y: u32| (y * width + x) as usize;

    for start_y in 0..height {
        for start_x in 0..width {
            if visited[index(start_x, start_y)] || mask.get_pixel(start_x, start_y)[0] == 0 {
                continue;
            }
            let mut stack = vec![(start_x, start_y)];
            visited[index(start_x, start_y)] = true;
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (start_x, start_y, start_x, start_y);
            let mut area: i64 = 0;
            while let Some((x, y)) = stack.pop() {
                area += 1;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        let nx = x as i32 + dx;
                        let ny = y as i32 + dy;
                        if nx < 0 || ny < 0 || nx as u32 >= width || ny as u32 >= height {
                            continue;
                        }
                        let (nx, ny) = (nx as u32, ny as u32);
                        if !visited[index(nx, ny)] && mask.get_pixel(nx, ny)[0] > 0 {
                            visited[index(nx, ny)] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
            }
            regions.push(Region {
                rect: Rect::new(min_x as i32, min_y as i32, max_x as i32 + 1, max_y as i32 + 1),
                area,
            });
        }
    }
    regions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_with_block(width: u32, height: u32, rect: Rect) -> GrayImage {
        let mut mask = GrayImage::new(width, height);
        for y in rect.min_y..rect.max_y {
            for x in rect.min_x..rect.max_x {
                mask.put_pixel(x as u32, y as u32, image::Luma([255]));
            }
        }
        mask
    }

    #[test]
    fn test_threshold() {
        let mut diff = GrayImage::new(4, 1);
        diff.put_pixel(0, 0, image::Luma([10]));
        diff.put_pixel(1, 0, image::Luma([150]));
        let mask = threshold(&diff, 40); // cutoff = 102
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
        assert_eq!(mask.get_pixel(1, 0)[0], 255);
    }

    #[test]
    fn test_dilate_grows_block() {
        let mask = mask_with_block(8, 8, Rect::new(3, 3, 5, 5));
        let dilated = dilate3x3(&mask);
        assert_eq!(dilated.get_pixel(2, 2)[0], 255);
        assert_eq!(dilated.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_find_single_region() {
        let mask = mask_with_block(16, 16, Rect::new(2, 3, 6, 9));
        let regions = find_regions(&mask);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].rect, Rect::new(2, 3, 6, 9));
        assert_eq!(regions[0].area, 24);
    }

    #[test]
    fn test_find_separate_regions() {
        let mut mask = mask_with_block(16, 16, Rect::new(0, 0, 3, 3));
        for y in 10..13 {
            for x in 10..13 {
                mask.put_pixel(x, y, image::Luma([255]));
            }
        }
        let regions = find_regions(&mask);
        assert_eq!(regions.len(), 2);
    }

    #[test]
    fn test_empty_mask_no_regions() {
        let mask = GrayImage::new(8, 8);
        assert!(find_regions(&mask).is_empty());
    }
}
