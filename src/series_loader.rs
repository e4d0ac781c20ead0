use crate::{enums::SortBy, series::ScanSeries};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use log::debug;
use ndarray::{Array2, Array3, s};
use rayon::prelude::*;
use std::{fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeriesLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Missing spacing information")]
    MissingSpacing,

    #[error("Missing image orientation")]
    MissingOrientation,

    #[error("Missing image position in image {index}")]
    MissingPosition { index: usize },

    #[error("Cannot decode pixel data of image {index}: {reason}")]
    UndecodableImage { index: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

struct SliceImage {
    order: Option<f64>,
    position: Option<[f64; 3]>,
    pixels: Array2<f32>,
}

pub struct SeriesLoader;

impl SeriesLoader {
    /// Load a series from DICOM objects
    ///
    /// # Errors
    ///
    /// Returns error if no images are given, any image cannot be decoded or
    /// lacks the position it is sorted by, dimensions are inconsistent, or
    /// orientation or spacing cannot be read
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
        source: &Path,
    ) -> Result<ScanSeries, SeriesLoaderError> {
        let orientation = dicom_objects
            .iter()
            .find_map(|dicom_object| Self::get_orientation(dicom_object))
            .ok_or(SeriesLoaderError::MissingOrientation)?;
        let normal = Self::slice_normal(&orientation);

        let mut images = dicom_objects
            .par_iter()
            .enumerate()
            .map(|(index, dicom_object)| {
                Self::extract_image_with_order(dicom_object, index, sort_by, &normal)
            })
            .collect::<Result<Vec<_>, _>>()?;

        if images.is_empty() {
            return Err(SeriesLoaderError::NoValidImages);
        }

        Self::sort_images(&mut images, sort_by);
        Self::validate_dimensions(&images)?;

        let (row_spacing, col_spacing) = Self::get_pixel_spacing(dicom_objects)
            .ok_or(SeriesLoaderError::MissingSpacing)?;
        let slice_spacing = Self::slice_spacing(&images, &normal)
            .or_else(|| Self::get_slice_thickness(dicom_objects))
            .ok_or(SeriesLoaderError::MissingSpacing)?;
        let origin = images[0]
            .position
            .map(|[x, y, z]| (x, y, z))
            .unwrap_or_default();

        debug!(
            "loaded {} slices from {}, spacing ({col_spacing}, {row_spacing}, {slice_spacing})",
            images.len(),
            source.display()
        );

        Ok(ScanSeries::new(
            Self::build_volume_array(&images),
            orientation,
            (col_spacing, row_spacing, slice_spacing),
            origin,
            source,
        ))
    }

    /// Load a series from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path> + Sync],
        sort_by: SortBy,
        source: &Path,
    ) -> Result<ScanSeries, SeriesLoaderError> {
        let objects: Result<Vec<_>, _> = paths
            .par_iter()
            .map(|path| open_file(path.as_ref()))
            .collect();

        Self::load_from_dicom_objects(&objects?, sort_by, source)
    }

    /// Load a series from a directory containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<ScanSeries, SeriesLoaderError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(SeriesLoaderError::NoValidImages);
        }

        Self::load_from_file_paths(&paths, sort_by, path.as_ref())
    }

    fn extract_image_with_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        index: usize,
        sort_by: SortBy,
        normal: &[f64; 3],
    ) -> Result<SliceImage, SeriesLoaderError> {
        let position = Self::get_position(dicom_object);
        let order = Self::get_sort_order(dicom_object, sort_by, position, normal)
            .ok_or(SeriesLoaderError::MissingPosition { index })?;
        let pixels = Self::decode_image(dicom_object)
            .map_err(|reason| SeriesLoaderError::UndecodableImage { index, reason })?;
        Ok(SliceImage {
            order,
            position,
            pixels,
        })
    }

    /// `None` when sorting by position and the image has none
    fn get_sort_order(
        dicom_object: &InMemDicomObject,
        sort_by: SortBy,
        position: Option<[f64; 3]>,
        normal: &[f64; 3],
    ) -> Option<Option<f64>> {
        match sort_by {
            SortBy::ImagePositionPatient => Some(Some(dot(&position?, normal))),
            SortBy::InstanceNumber => {
                let num = dicom_object
                    .element(tags::INSTANCE_NUMBER)
                    .ok()
                    .and_then(|element| element.to_int::<i32>().ok())
                    .map(f64::from);
                Some(num)
            }
            SortBy::None => Some(Some(0.0)),
        }
    }

    fn get_orientation(dicom_object: &InMemDicomObject) -> Option<[f64; 6]> {
        let values = dicom_object
            .element(tags::IMAGE_ORIENTATION_PATIENT)
            .ok()?
            .to_multi_float64()
            .ok()?;
        values.get(..6)?.try_into().ok()
    }

    fn get_position(dicom_object: &InMemDicomObject) -> Option<[f64; 3]> {
        let values = dicom_object
            .element(tags::IMAGE_POSITION_PATIENT)
            .ok()?
            .to_multi_float64()
            .ok()?;
        values.get(..3)?.try_into().ok()
    }

    /// Row and column spacing in mm
    fn get_pixel_spacing(dicom_objects: &[FileDicomObject<InMemDicomObject>]) -> Option<(f64, f64)> {
        dicom_objects.iter().find_map(|dicom_object| {
            let pixel_spacing = dicom_object
                .element(tags::PIXEL_SPACING)
                .ok()?
                .to_multi_float64()
                .ok()?;
            Some((*pixel_spacing.first()?, *pixel_spacing.get(1)?))
        })
    }

    fn get_slice_thickness(dicom_objects: &[FileDicomObject<InMemDicomObject>]) -> Option<f64> {
        dicom_objects.iter().find_map(|dicom_object| {
            dicom_object
                .element(tags::SLICE_THICKNESS)
                .ok()?
                .to_float64()
                .ok()
                .filter(|thickness| *thickness > 0.0)
        })
    }

    fn decode_image(
        dicom_object: &FileDicomObject<InMemDicomObject>,
    ) -> Result<Array2<f32>, String> {
        let pixel_data = dicom_object
            .decode_pixel_data()
            .map_err(|e| e.to_string())?;
        // modality LUT only, so values stay in HU
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::Identity);
        pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
            .map_err(|e| e.to_string())
    }

    fn slice_normal(orientation: &[f64; 6]) -> [f64; 3] {
        let [x1, y1, z1, x2, y2, z2] = *orientation;
        [y1 * z2 - z1 * y2, z1 * x2 - x1 * z2, x1 * y2 - y1 * x2]
    }

    fn sort_images(images: &mut [SliceImage], sort_by: SortBy) {
        if !matches!(sort_by, SortBy::None) {
            images.sort_by(|a, b| {
                a.order
                    .partial_cmp(&b.order)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
    }

    /// Median distance between neighbouring slices along the normal
    fn slice_spacing(images: &[SliceImage], normal: &[f64; 3]) -> Option<f64> {
        let positions = images
            .iter()
            .map(|image| image.position.map(|p| dot(&p, normal)))
            .collect::<Option<Vec<_>>>()?;
        let mut gaps: Vec<f64> = positions
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).abs())
            .filter(|gap| *gap > f64::EPSILON)
            .collect();
        if gaps.is_empty() {
            return None;
        }
        gaps.sort_by(f64::total_cmp);
        Some(gaps[gaps.len() / 2])
    }

    fn validate_dimensions(images: &[SliceImage]) -> Result<(), SeriesLoaderError> {
        let first_dim = images[0].pixels.dim();
        if images.iter().any(|img| img.pixels.dim() != first_dim) {
            return Err(SeriesLoaderError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_volume_array(images: &[SliceImage]) -> Array3<f32> {
        let (height, width) = images[0].pixels.dim();
        let depth = images.len();
        let mut volume = Array3::<f32>::zeros((depth, height, width));

        for (i, image) in images.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(&image.pixels);
        }

        volume
    }
}

fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom::core::{DataElement, PrimitiveValue, VR};
    use dicom::object::FileMetaTableBuilder;

    const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";
    const CT_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.2";

    /// 2x3 signed 16-bit axial slice at height `z`, every pixel `10 * z`
    fn ct_slice(z: f64, position: bool, pixels: bool) -> FileDicomObject<InMemDicomObject> {
        let mut dcm = InMemDicomObject::new_empty();
        dcm.put(DataElement::new(
            tags::IMAGE_ORIENTATION_PATIENT,
            VR::DS,
            PrimitiveValue::F64([1.0, 0.0, 0.0, 0.0, 1.0, 0.0].into_iter().collect()),
        ));
        if position {
            dcm.put(DataElement::new(
                tags::IMAGE_POSITION_PATIENT,
                VR::DS,
                PrimitiveValue::F64([0.0, 0.0, z].into_iter().collect()),
            ));
        }
        dcm.put(DataElement::new(
            tags::PIXEL_SPACING,
            VR::DS,
            PrimitiveValue::F64([1.0, 1.0].into_iter().collect()),
        ));
        for (tag, value) in [
            (tags::ROWS, 2u16),
            (tags::COLUMNS, 3),
            (tags::SAMPLES_PER_PIXEL, 1),
            (tags::BITS_ALLOCATED, 16),
            (tags::BITS_STORED, 16),
            (tags::HIGH_BIT, 15),
            (tags::PIXEL_REPRESENTATION, 1),
        ] {
            dcm.put(DataElement::new(tag, VR::US, PrimitiveValue::from(value)));
        }
        dcm.put(DataElement::new(
            tags::PHOTOMETRIC_INTERPRETATION,
            VR::CS,
            PrimitiveValue::from("MONOCHROME2"),
        ));
        if pixels {
            let value = (z * 10.0) as i16;
            let bytes: Vec<u8> = (0..6).flat_map(|_| value.to_le_bytes()).collect();
            dcm.put(DataElement::new(
                tags::PIXEL_DATA,
                VR::OW,
                PrimitiveValue::U8(bytes.into_iter().collect()),
            ));
        }
        dcm.with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(EXPLICIT_VR_LE)
                .media_storage_sop_class_uid(CT_IMAGE_STORAGE)
                .media_storage_sop_instance_uid(format!("1.2.826.0.1.{}", z as u32)),
        )
        .unwrap()
    }

    fn series_objects(skip_pixels: Option<usize>) -> Vec<FileDicomObject<InMemDicomObject>> {
        // shuffled heights 0, 2, ..., 10
        [6.0, 0.0, 10.0, 4.0, 2.0, 8.0]
            .into_iter()
            .enumerate()
            .map(|(i, z)| ct_slice(z, true, skip_pixels != Some(i)))
            .collect()
    }

    #[test]
    fn test_load_sorts_every_slice() {
        let series = SeriesLoader::load_from_dicom_objects(
            &series_objects(None),
            SortBy::ImagePositionPatient,
            Path::new("ID_1/dicom"),
        )
        .unwrap();
        assert_eq!(series.dim(), (6, 2, 3));
        assert_eq!(series.spacing(), (1.0, 1.0, 2.0));
        assert_eq!(series.origin(), (0.0, 0.0, 0.0));
        assert_eq!(series.data()[[0, 0, 0]], 0.0);
        assert_eq!(series.data()[[5, 1, 2]], 100.0);
    }

    #[test]
    fn test_undecodable_image_fails_the_series() {
        let result = SeriesLoader::load_from_dicom_objects(
            &series_objects(Some(3)),
            SortBy::ImagePositionPatient,
            Path::new("ID_1/dicom"),
        );
        assert!(matches!(
            result,
            Err(SeriesLoaderError::UndecodableImage { index: 3, .. })
        ));
    }

    #[test]
    fn test_missing_position_fails_position_sort() {
        let mut objects = series_objects(None);
        objects[4] = ct_slice(2.0, false, true);
        let result = SeriesLoader::load_from_dicom_objects(
            &objects,
            SortBy::ImagePositionPatient,
            Path::new("ID_1/dicom"),
        );
        assert!(matches!(
            result,
            Err(SeriesLoaderError::MissingPosition { index: 4 })
        ));
    }

    fn slice(order: f64, z: f64, value: f32) -> SliceImage {
        SliceImage {
            order: Some(order),
            position: Some([0.0, 0.0, z]),
            pixels: Array2::from_elem((2, 3), value),
        }
    }

    #[test]
    fn test_orientation_and_position_from_tags() {
        let mut dcm = InMemDicomObject::new_empty();
        dcm.put(DataElement::new(
            tags::IMAGE_ORIENTATION_PATIENT,
            VR::FD,
            PrimitiveValue::F64([1.0, 0.0, 0.0, 0.0, 0.97, -0.24].into_iter().collect()),
        ));
        dcm.put(DataElement::new(
            tags::IMAGE_POSITION_PATIENT,
            VR::FD,
            PrimitiveValue::F64([-120.0, -90.5, 33.0].into_iter().collect()),
        ));

        assert_eq!(
            SeriesLoader::get_orientation(&dcm),
            Some([1.0, 0.0, 0.0, 0.0, 0.97, -0.24])
        );
        assert_eq!(SeriesLoader::get_position(&dcm), Some([-120.0, -90.5, 33.0]));
    }

    #[test]
    fn test_missing_orientation() {
        let dcm = InMemDicomObject::new_empty();
        assert_eq!(SeriesLoader::get_orientation(&dcm), None);
    }

    #[test]
    fn test_axial_normal_points_along_z() {
        let normal = SeriesLoader::slice_normal(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        assert_eq!(normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_sort_and_spacing() {
        let mut images = vec![
            slice(7.5, 7.5, 3.0),
            slice(0.0, 0.0, 0.0),
            slice(5.0, 5.0, 2.0),
            slice(2.5, 2.5, 1.0),
        ];
        SeriesLoader::sort_images(&mut images, SortBy::ImagePositionPatient);
        let values: Vec<f32> = images.iter().map(|i| i.pixels[[0, 0]]).collect();
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0]);

        let spacing = SeriesLoader::slice_spacing(&images, &[0.0, 0.0, 1.0]);
        assert_eq!(spacing, Some(2.5));

        let volume = SeriesLoader::build_volume_array(&images);
        assert_eq!(volume.dim(), (4, 2, 3));
        assert_eq!(volume[[3, 1, 2]], 3.0);
    }

    #[test]
    fn test_unsorted_order_is_kept_for_none() {
        let mut images = vec![slice(2.0, 2.0, 2.0), slice(1.0, 1.0, 1.0)];
        SeriesLoader::sort_images(&mut images, SortBy::None);
        assert_eq!(images[0].pixels[[0, 0]], 2.0);
    }

    #[test]
    fn test_spacing_requires_distinct_positions() {
        let images = vec![slice(0.0, 4.0, 0.0), slice(0.0, 4.0, 0.0)];
        assert_eq!(SeriesLoader::slice_spacing(&images, &[0.0, 0.0, 1.0]), None);
    }

    #[test]
    fn test_inconsistent_dimensions() {
        let mut images = vec![slice(0.0, 0.0, 0.0)];
        images.push(SliceImage {
            order: Some(1.0),
            position: None,
            pixels: Array2::zeros((3, 3)),
        });
        assert!(matches!(
            SeriesLoader::validate_dimensions(&images),
            Err(SeriesLoaderError::InconsistentDimensions)
        ));
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not dicom").unwrap();
        assert!(matches!(
            SeriesLoader::load_from_directory(dir.path(), SortBy::default()),
            Err(SeriesLoaderError::NoValidImages)
        ));
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SeriesLoader::load_from_directory(dir.path().join("missing"), SortBy::default()),
            Err(SeriesLoaderError::Io(_))
        ));
    }
}
