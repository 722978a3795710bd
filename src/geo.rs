// https://docs.ogc.org/is/19-008r4/19-008r4.html#_geotiff_tags_for_coordinate_transformations

use crate::tiff::{Ifd, TagId};
use std::fmt::Display;

const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;
const USER_DEFINED: u16 = 32767;

/// Pixel to model space affine transform, `x = a*col + b*row + c`, `y = d*col + e*row + f`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoTransform {
    pub coefficients: [f64; 6],
}

impl Default for GeoTransform {
    /// Pixel space with rows growing downward.
    fn default() -> Self {
        Self {
            coefficients: [1.0, 0.0, 0.0, 0.0, -1.0, 0.0],
        }
    }
}

impl GeoTransform {
    pub fn parse(ifd: &Ifd) -> Option<Self> {
        let tiepoint = ifd.get_tag_values::<f64>(TagId::ModelTiepoint).ok();
        let pixel_scale = ifd.get_tag_values::<f64>(TagId::ModelPixelScale).ok();
        let transformation = ifd.get_tag_values::<f64>(TagId::ModelTransformation).ok();

        match (tiepoint, pixel_scale, transformation) {
            (Some(tp), Some(scale), _) if tp.len() >= 6 && scale.len() >= 2 => {
                let (i, j, x, y) = (tp[0], tp[1], tp[3], tp[4]);
                let (sx, sy) = (scale[0], scale[1]);
                Some(Self {
                    coefficients: [sx, 0.0, x - i * sx, 0.0, -sy, y + j * sy],
                })
            }
            (_, _, Some(m)) if m.len() >= 8 => Some(Self {
                coefficients: [m[0], m[1], m[3], m[4], m[5], m[7]],
            }),
            _ => None,
        }
    }

    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let [a, b, c, d, e, f] = self.coefficients;
        (a * col + b * row + c, d * col + e * row + f)
    }
}

/// EPSG code from the GeoKeyDirectory, if one is declared.
pub fn epsg_code(ifd: &Ifd) -> Option<u16> {
    let directory: Vec<u16> = ifd.get_tag_values(TagId::GeoKeyDirectory).ok()?;
    let key_count = *directory.get(3)? as usize;
    let keys = directory.get(4..4 + key_count * 4)?;

    let lookup = |id: u16| {
        keys.chunks_exact(4)
            .find(|key| key[0] == id && key[1] == 0 && key[2] == 1)
            .map(|key| key[3])
            .filter(|code| *code != 0 && *code != USER_DEFINED)
    };
    lookup(PROJECTED_CS_TYPE_GEO_KEY).or_else(|| lookup(GEOGRAPHIC_TYPE_GEO_KEY))
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Extent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Extent {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Model space bounds of the pixel rectangle `[col_min, col_max) x [row_min, row_max)`.
    pub fn of_pixels(
        transform: &GeoTransform,
        col_min: u32,
        row_min: u32,
        col_max: u32,
        row_max: u32,
    ) -> Self {
        let corners = [
            transform.apply(col_min as f64, row_min as f64),
            transform.apply(col_max as f64, row_min as f64),
            transform.apply(col_min as f64, row_max as f64),
            transform.apply(col_max as f64, row_max as f64),
        ];
        let (mut xmin, mut ymin) = (f64::INFINITY, f64::INFINITY);
        let (mut xmax, mut ymax) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (x, y) in corners {
            xmin = xmin.min(x);
            ymin = ymin.min(y);
            xmax = xmax.max(x);
            ymax = ymax.max(y);
        }
        Self::new(xmin, ymin, xmax, ymax)
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }
}

impl Display for Extent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Extent({}, {}, {}, {})",
            self.xmin, self.ymin, self.xmax, self.ymax
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiff::{Endian, TagData};

    #[test]
    fn tiepoint_and_scale() {
        let mut ifd = Ifd::default();
        let e = Endian::Little;
        ifd.set_tag(
            TagId::ModelTiepoint,
            TagData::Double(vec![0.0, 0.0, 0.0, 500_000.0, 4_000_000.0, 0.0]),
            e,
        );
        ifd.set_tag(TagId::ModelPixelScale, TagData::Double(vec![30.0, 30.0, 0.0]), e);
        let transform = GeoTransform::parse(&ifd).unwrap();
        let extent = Extent::of_pixels(&transform, 10, 20, 20, 40);
        assert_eq!(extent, Extent::new(500_300.0, 3_998_800.0, 500_600.0, 3_999_400.0));
    }

    #[test]
    fn epsg_prefers_projected() {
        let mut ifd = Ifd::default();
        ifd.set_tag(
            TagId::GeoKeyDirectory,
            TagData::Short(vec![1, 1, 0, 2, 2048, 0, 1, 4326, 3072, 0, 1, 32610]),
            Endian::Big,
        );
        assert_eq!(epsg_code(&ifd), Some(32610));
    }

    #[test]
    fn missing_geokeys() {
        assert_eq!(epsg_code(&Ifd::default()), None);
        assert!(GeoTransform::parse(&Ifd::default()).is_none());
    }
}
