use image::RgbImage;

use crate::detection::domain::face_detector::FaceDetector;
use crate::filtering::domain::face_filter::{FaceFilter, TrackOptions};
use crate::filtering::domain::filter_renderer::FilterRenderer;
use crate::session::face_id::FaceId;
use crate::session::filter_event::{FilterEvent, FilterEventListener, NullEventListener};
use crate::session::session_error::SessionError;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Per-face filter composition over a single current image.
///
/// Faces are registered by [`detect`](Self::detect) (or
/// [`register_face`](Self::register_face)) and get an ordered filter list.
/// Filters queued for a face compose in registration order; faces compose
/// in registration order. Every operation crops the face box, renders the
/// crop and pastes it back, so pixels outside every face box are never
/// touched.
///
/// Failures are reported to the listener as [`FilterEvent::Error`] before
/// being returned.
pub struct FaceFilterSession {
    detector: Box<dyn FaceDetector>,
    renderer: Box<dyn FilterRenderer>,
    listener: Box<dyn FilterEventListener>,
    image: Option<Frame>,
    // Parallel arrays indexed by FaceId.
    regions: Vec<Region>,
    filters: Vec<Vec<FaceFilter>>,
}

impl FaceFilterSession {
    pub fn new(detector: Box<dyn FaceDetector>, renderer: Box<dyn FilterRenderer>) -> Self {
        Self {
            detector,
            renderer,
            listener: Box::new(NullEventListener),
            image: None,
            regions: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub fn with_listener(mut self, listener: Box<dyn FilterEventListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Makes `frame` the current image and registers the faces found in it.
    ///
    /// Returns the ids of this detection in detector order. A box identical
    /// to an already registered face keeps that face's id and filters.
    pub fn detect(&mut self, frame: Frame) -> Result<Vec<FaceId>, SessionError> {
        let result = self.detector.detect(&frame);
        let frame_index = frame.index();
        self.image = Some(frame);

        let regions = match result {
            Ok(regions) => regions,
            Err(e) => return Err(self.fail("detect", SessionError::Detection(e.to_string()))),
        };
        let mut ids: Vec<FaceId> = Vec::new();
        for region in regions {
            let id = self.register_face(region);
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        log::debug!("Frame {frame_index}: registered {} face(s)", ids.len());
        self.emit(FilterEvent::FacesDetected {
            frame_index,
            count: ids.len(),
        });
        Ok(ids)
    }

    /// Registers a face box with an empty filter list, or returns the id of
    /// an identical box registered earlier.
    pub fn register_face(&mut self, region: Region) -> FaceId {
        if let Some(index) = self.regions.iter().position(|r| *r == region) {
            return FaceId::new(index);
        }
        self.regions.push(region);
        self.filters.push(Vec::new());
        FaceId::new(self.regions.len() - 1)
    }

    /// Appends `filter` to the face's list without rendering it.
    pub fn add_filter(&mut self, filter: FaceFilter, face: FaceId) -> Result<(), SessionError> {
        let result = self.check_face(face).and_then(|_| Ok(filter.validate()?));
        if let Err(e) = result {
            return Err(self.fail("add_filter", e));
        }
        log::debug!("Queued {filter} on {face}");
        self.emit(FilterEvent::FilterQueued {
            face,
            filter: filter.to_string(),
        });
        self.filters[face.index()].push(filter);
        Ok(())
    }

    /// Queues an outline drawn along the inside of the face box.
    pub fn track(&mut self, face: FaceId, options: TrackOptions) -> Result<(), SessionError> {
        self.add_filter(options.into(), face)
    }

    pub fn blur(&mut self, face: FaceId, radius: f32) -> Result<(), SessionError> {
        self.add_filter(FaceFilter::blur(radius), face)
    }

    /// Renders one filter into the face box of the current image right away.
    ///
    /// The filter is not queued. On failure the current image is unchanged.
    pub fn apply_filter(
        &mut self,
        filter: &FaceFilter,
        face: FaceId,
    ) -> Result<&Frame, SessionError> {
        let result = self.check_face(face).and_then(|region| {
            filter.validate()?;
            let image = self.image.as_mut().ok_or(SessionError::NoImage)?;
            composite(self.renderer.as_ref(), image, region, filter, face)
        });
        if let Err(e) = result {
            return Err(self.fail("apply_filter", e));
        }
        self.current_image()
    }

    /// Renders every queued filter: faces in registration order, each
    /// face's filters in queue order. Queues are kept, not drained.
    ///
    /// With no faces this returns the image unchanged.
    pub fn apply_filters(&mut self) -> Result<&Frame, SessionError> {
        let mut applied = 0;
        let result = match self.image.as_mut() {
            None => Err(SessionError::NoImage),
            Some(image) => self
                .regions
                .iter()
                .zip(&self.filters)
                .enumerate()
                .flat_map(|(i, (region, list))| list.iter().map(move |f| (i, *region, f)))
                .try_for_each(|(i, region, filter)| {
                    applied += 1;
                    composite(self.renderer.as_ref(), image, region, filter, FaceId::new(i))
                }),
        };
        if let Err(e) = result {
            return Err(self.fail("apply_filters", e));
        }
        self.emit(FilterEvent::FiltersApplied {
            faces: self.regions.len(),
            filters: applied,
        });
        self.current_image()
    }

    /// Greyscales the whole image except the registered face boxes.
    ///
    /// With no faces the entire image ends up greyscale.
    pub fn color_pop(&mut self) -> Result<&Frame, SessionError> {
        let result = match self.image.as_mut() {
            None => Err(SessionError::NoImage),
            Some(image) => {
                let mut grey = image.clone();
                match self.renderer.greyscale(&mut grey) {
                    Ok(()) => {
                        for region in &self.regions {
                            let r = region.clamp_to(image.width(), image.height());
                            grey.paste(&image.crop(&r), r.x, r.y);
                        }
                        *image = grey;
                        Ok(())
                    }
                    Err(e) => Err(SessionError::Greyscale(e.to_string())),
                }
            }
        };
        if let Err(e) = result {
            return Err(self.fail("color_pop", e));
        }
        self.current_image()
    }

    /// Draws `image` resized to the face box over the current image.
    pub fn replace(&mut self, face: FaceId, image: RgbImage) -> Result<&Frame, SessionError> {
        self.apply_filter(&FaceFilter::replace(image), face)
    }

    pub fn image(&self) -> Option<&Frame> {
        self.image.as_ref()
    }

    pub fn set_image(&mut self, frame: Frame) {
        self.image = Some(frame);
    }

    pub fn take_image(&mut self) -> Option<Frame> {
        self.image.take()
    }

    pub fn faces(&self) -> impl ExactSizeIterator<Item = FaceId> {
        (0..self.regions.len()).map(FaceId::new)
    }

    pub fn region(&self, face: FaceId) -> Option<Region> {
        self.regions.get(face.index()).copied()
    }

    pub fn filters(&self, face: FaceId) -> Option<&[FaceFilter]> {
        self.filters.get(face.index()).map(Vec::as_slice)
    }

    pub fn face_count(&self) -> usize {
        self.regions.len()
    }

    /// Forgets every face and its queued filters. Ids issued before this
    /// call must not be reused.
    pub fn clear_faces(&mut self) {
        self.regions.clear();
        self.filters.clear();
    }

    pub fn emit(&mut self, event: FilterEvent) {
        self.listener.on_event(&event);
    }

    /// Asks the listener for its end-of-run summary.
    pub fn finish(&self) {
        self.listener.summary();
    }

    fn check_face(&self, face: FaceId) -> Result<Region, SessionError> {
        self.region(face).ok_or(SessionError::UnknownFace(face))
    }

    fn current_image(&self) -> Result<&Frame, SessionError> {
        self.image.as_ref().ok_or(SessionError::NoImage)
    }

    fn fail(&mut self, operation: &'static str, error: SessionError) -> SessionError {
        self.emit(FilterEvent::Error {
            operation,
            message: error.to_string(),
        });
        error
    }
}

/// Crop, render, paste. `image` is only written once rendering succeeded.
fn composite(
    renderer: &dyn FilterRenderer,
    image: &mut Frame,
    region: Region,
    filter: &FaceFilter,
    face: FaceId,
) -> Result<(), SessionError> {
    let r = region.clamp_to(image.width(), image.height());
    if r.is_empty() {
        log::warn!(
            "{face} lies outside the {}x{} image, skipping {}",
            image.width(),
            image.height(),
            filter.kind()
        );
        return Ok(());
    }
    // Replacement is sized to the whole face box; paste clips what falls off-frame.
    let (mut patch, x, y) = match filter {
        FaceFilter::Replace { .. } => {
            let (w, h) = (region.width as u32, region.height as u32);
            let len = w as usize * h as usize * image.channels() as usize;
            let blank = Frame::new(vec![0; len], w, h, image.channels(), image.index());
            (blank, region.x, region.y)
        }
        _ => (image.crop(&r), r.x, r.y),
    };
    renderer
        .render(&mut patch, filter)
        .map_err(|e| SessionError::Render {
            face,
            filter: filter.to_string(),
            message: e.to_string(),
        })?;
    image.paste(&patch, x, y);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::infrastructure::fixed_face_detector::FixedFaceDetector;
    use crate::filtering::infrastructure::cpu_filter_renderer::CpuFilterRenderer;
    use crate::shared::color::Color;
    use image::imageops::{self, FilterType};
    use image::Rgb;
    use rstest::rstest;
    use std::sync::{Arc, Mutex};

    // --- Stubs ---

    struct FailingDetector;

    impl FaceDetector for FailingDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
            Err("model exploded".into())
        }
    }

    struct FailingRenderer;

    impl FilterRenderer for FailingRenderer {
        fn render(
            &self,
            patch: &mut Frame,
            _filter: &FaceFilter,
        ) -> Result<(), Box<dyn std::error::Error>> {
            patch.data_mut().fill(1);
            Err("gpu lost".into())
        }

        fn greyscale(&self, _frame: &mut Frame) -> Result<(), Box<dyn std::error::Error>> {
            Err("gpu lost".into())
        }
    }

    struct RecordingListener {
        events: Arc<Mutex<Vec<FilterEvent>>>,
    }

    impl FilterEventListener for RecordingListener {
        fn on_event(&mut self, event: &FilterEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    // --- Helpers ---

    const FACE_A: Region = Region {
        x: 4,
        y: 4,
        width: 10,
        height: 10,
    };
    const FACE_B: Region = Region {
        x: 20,
        y: 16,
        width: 8,
        height: 12,
    };

    /// 32x32 frame with distinct colors in every pixel.
    fn colorful_frame() -> Frame {
        let mut data = Vec::with_capacity(32 * 32 * 3);
        for y in 0..32u32 {
            for x in 0..32u32 {
                data.extend_from_slice(&[(x * 8) as u8, (y * 8) as u8, ((x + y) * 4) as u8]);
            }
        }
        Frame::new(data, 32, 32, 3, 0)
    }

    fn session_with(regions: Vec<Region>) -> FaceFilterSession {
        FaceFilterSession::new(
            Box::new(FixedFaceDetector::new(regions)),
            Box::new(CpuFilterRenderer::new()),
        )
    }

    fn recorded(session: FaceFilterSession) -> (FaceFilterSession, Arc<Mutex<Vec<FilterEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let session = session.with_listener(Box::new(RecordingListener {
            events: events.clone(),
        }));
        (session, events)
    }

    fn error_operations(events: &Arc<Mutex<Vec<FilterEvent>>>) -> Vec<&'static str> {
        events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                FilterEvent::Error { operation, .. } => Some(*operation),
                _ => None,
            })
            .collect()
    }

    fn inside_any(x: u32, y: u32, regions: &[Region]) -> bool {
        regions.iter().any(|r| {
            let (x, y) = (x as i32, y as i32);
            x >= r.x && x < r.x + r.width && y >= r.y && y < r.y + r.height
        })
    }

    // --- Tests ---

    #[test]
    fn test_detect_registers_each_face_with_empty_list() {
        let mut session = session_with(vec![FACE_A, FACE_B]);
        let ids = session.detect(colorful_frame()).unwrap();

        assert_eq!(ids.len(), 2);
        assert_eq!(session.face_count(), 2);
        assert_eq!(session.region(ids[0]), Some(FACE_A));
        assert_eq!(session.region(ids[1]), Some(FACE_B));
        for id in ids {
            assert_eq!(session.filters(id), Some(&[][..]));
        }
        assert!(session.image().is_some());
    }

    #[test]
    fn test_detect_reuses_ids_for_identical_boxes() {
        let mut session = session_with(vec![FACE_A]);
        let first = session.detect(colorful_frame()).unwrap();
        session.blur(first[0], 2.0).unwrap();
        let second = session.detect(colorful_frame()).unwrap();

        assert_eq!(first, second);
        assert_eq!(session.face_count(), 1);
        assert_eq!(session.filters(first[0]).unwrap().len(), 1);
    }

    #[test]
    fn test_detect_collapses_duplicate_boxes_in_one_frame() {
        let (mut session, events) = recorded(session_with(vec![FACE_A, FACE_A]));
        let ids = session.detect(colorful_frame()).unwrap();

        assert_eq!(ids.len(), 1);
        assert_eq!(session.face_count(), 1);
        let counts: Vec<usize> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                FilterEvent::FacesDetected { count, .. } => Some(*count),
                _ => None,
            })
            .collect();
        assert_eq!(counts, vec![1]);
    }

    #[test]
    fn test_detect_error_is_emitted_and_returned() {
        let (mut session, events) = recorded(FaceFilterSession::new(
            Box::new(FailingDetector),
            Box::new(CpuFilterRenderer::new()),
        ));
        let err = session.detect(colorful_frame()).unwrap_err();

        assert!(matches!(err, SessionError::Detection(ref m) if m.contains("model exploded")));
        assert_eq!(error_operations(&events), vec!["detect"]);
        assert_eq!(session.face_count(), 0);
    }

    #[test]
    fn test_appending_preserves_earlier_filters_in_order() {
        let mut session = session_with(vec![FACE_A]);
        let face = session.detect(colorful_frame()).unwrap()[0];

        session.blur(face, 3.0).unwrap();
        session.track(face, TrackOptions::default()).unwrap();
        session
            .add_filter(FaceFilter::Pixelate { block: 4 }, face)
            .unwrap();

        assert_eq!(
            session.filters(face).unwrap(),
            &[
                FaceFilter::blur(3.0),
                FaceFilter::outline(Color::WHITE, 3),
                FaceFilter::Pixelate { block: 4 },
            ]
        );
    }

    #[test]
    fn test_apply_filters_without_faces_is_noop() {
        let mut session = session_with(Vec::new());
        session.detect(colorful_frame()).unwrap();
        let out = session.apply_filters().unwrap();
        assert_eq!(out, &colorful_frame());
    }

    #[test]
    fn test_apply_filters_without_image_is_error() {
        let (mut session, events) = recorded(session_with(Vec::new()));
        assert_eq!(session.apply_filters().unwrap_err(), SessionError::NoImage);
        assert_eq!(error_operations(&events), vec!["apply_filters"]);
    }

    #[test]
    fn test_apply_filters_leaves_pixels_outside_faces_untouched() {
        let mut session = session_with(vec![FACE_A, FACE_B]);
        let ids = session.detect(colorful_frame()).unwrap();
        session.blur(ids[0], 4.0).unwrap();
        session
            .add_filter(FaceFilter::Pixelate { block: 3 }, ids[1])
            .unwrap();
        session.add_filter(FaceFilter::Greyscale, ids[1]).unwrap();

        let original = colorful_frame();
        let out = session.apply_filters().unwrap();
        let mut changed_inside = false;
        for y in 0..32 {
            for x in 0..32 {
                if inside_any(x, y, &[FACE_A, FACE_B]) {
                    changed_inside |= out.pixel(x, y) != original.pixel(x, y);
                } else {
                    assert_eq!(out.pixel(x, y), original.pixel(x, y), "pixel ({x},{y})");
                }
            }
        }
        assert!(changed_inside);
    }

    #[test]
    fn test_filters_compose_in_registration_order() {
        let black = Frame::new(vec![0; 32 * 32 * 3], 32, 32, 3, 0);

        let mut crisp = session_with(vec![FACE_A]);
        let face = crisp.detect(black.clone()).unwrap()[0];
        crisp.blur(face, 2.0).unwrap();
        crisp.track(face, TrackOptions { stroke: Color::WHITE, line_width: 1 }).unwrap();
        let crisp_corner = crisp.apply_filters().unwrap().pixel(4, 4).to_vec();

        let mut soft = session_with(vec![FACE_A]);
        let face = soft.detect(black).unwrap()[0];
        soft.track(face, TrackOptions { stroke: Color::WHITE, line_width: 1 }).unwrap();
        soft.blur(face, 2.0).unwrap();
        let soft_corner = soft.apply_filters().unwrap().pixel(4, 4).to_vec();

        assert_eq!(crisp_corner, vec![255, 255, 255]);
        assert!(soft_corner[0] < 255);
    }

    #[test]
    fn test_apply_filter_does_not_queue() {
        let mut session = session_with(vec![FACE_A]);
        let face = session.detect(colorful_frame()).unwrap()[0];
        let out = session
            .apply_filter(&FaceFilter::outline(Color::rgb(255, 0, 0), 1), face)
            .unwrap();

        assert_eq!(out.pixel(4, 4), &[255, 0, 0]);
        assert_eq!(out.pixel(3, 3), colorful_frame().pixel(3, 3));
        assert!(session.filters(face).unwrap().is_empty());
    }

    #[test]
    fn test_color_pop_without_faces_is_fully_grey() {
        let mut session = session_with(Vec::new());
        session.detect(colorful_frame()).unwrap();
        let out = session.color_pop().unwrap();
        assert!(out.data().chunks(3).all(|px| px[0] == px[1] && px[1] == px[2]));
    }

    #[test]
    fn test_color_pop_keeps_face_colors() {
        let mut session = session_with(vec![FACE_A]);
        session.detect(colorful_frame()).unwrap();
        let original = colorful_frame();
        let out = session.color_pop().unwrap();

        assert_eq!(out.pixel(8, 8), original.pixel(8, 8));
        let outside = out.pixel(30, 2);
        assert!(outside[0] == outside[1] && outside[1] == outside[2]);
    }

    #[test]
    fn test_replace_draws_resized_image_in_face_box() {
        let mut session = session_with(vec![FACE_B]);
        let face = session.detect(colorful_frame()).unwrap()[0];
        let overlay = RgbImage::from_fn(5, 7, |x, y| Rgb([200, (x * 40) as u8, (y * 30) as u8]));
        let expected = imageops::resize(&overlay, 8, 12, FilterType::Triangle);

        session.replace(face, overlay).unwrap();
        let out = session.image().unwrap();
        for y in 0..12 {
            for x in 0..8 {
                assert_eq!(
                    out.pixel(FACE_B.x as u32 + x, FACE_B.y as u32 + y),
                    &expected.get_pixel(x, y).0
                );
            }
        }
        assert_eq!(out.pixel(0, 0), colorful_frame().pixel(0, 0));
    }

    #[test]
    fn test_replace_clips_box_past_frame_edge() {
        let mut session = session_with(vec![]);
        session.set_image(colorful_frame());
        let face = session.register_face(Region::new(-5, 0, 10, 10));
        let overlay = RgbImage::from_fn(10, 10, |x, _| Rgb([(x * 25) as u8, 0, 0]));
        let expected = imageops::resize(&overlay, 10, 10, FilterType::Triangle);

        session.replace(face, overlay).unwrap();
        let out = session.image().unwrap();
        for y in 0..10 {
            for x in 0..5 {
                assert_eq!(out.pixel(x, y), &expected.get_pixel(x + 5, y).0);
            }
        }
        assert_eq!(out.pixel(5, 0), colorful_frame().pixel(5, 0));
    }

    #[rstest]
    #[case::add_filter("add_filter")]
    #[case::track("track")]
    #[case::blur("blur")]
    #[case::apply_filter("apply_filter")]
    #[case::replace("replace")]
    fn test_unknown_face_is_error(#[case] operation: &str) {
        let (mut session, events) = recorded(session_with(vec![FACE_A]));
        session.detect(colorful_frame()).unwrap();
        let ghost = FaceId::new(7);

        let err = match operation {
            "add_filter" => session.add_filter(FaceFilter::Greyscale, ghost).unwrap_err(),
            "track" => session.track(ghost, TrackOptions::default()).unwrap_err(),
            "blur" => session.blur(ghost, 2.0).unwrap_err(),
            "apply_filter" => session
                .apply_filter(&FaceFilter::Greyscale, ghost)
                .unwrap_err(),
            _ => session.replace(ghost, RgbImage::new(2, 2)).unwrap_err(),
        };

        assert_eq!(err, SessionError::UnknownFace(ghost));
        assert_eq!(error_operations(&events).len(), 1);
        assert_eq!(session.image(), Some(&colorful_frame()));
    }

    #[test]
    fn test_invalid_filter_is_rejected() {
        let mut session = session_with(vec![FACE_A]);
        let face = session.detect(colorful_frame()).unwrap()[0];
        let err = session.blur(face, 0.0).unwrap_err();
        assert!(matches!(err, SessionError::InvalidFilter(_)));
        assert!(session.filters(face).unwrap().is_empty());
    }

    #[test]
    fn test_render_failure_leaves_image_unchanged() {
        let (mut session, events) = recorded(FaceFilterSession::new(
            Box::new(FixedFaceDetector::new(vec![FACE_A])),
            Box::new(FailingRenderer),
        ));
        let face = session.detect(colorful_frame()).unwrap()[0];
        session.add_filter(FaceFilter::Greyscale, face).unwrap();

        let err = session.apply_filters().unwrap_err();
        assert!(matches!(err, SessionError::Render { face: f, .. } if f == face));
        assert_eq!(session.image(), Some(&colorful_frame()));
        assert_eq!(error_operations(&events), vec!["apply_filters"]);
    }

    #[test]
    fn test_events_follow_operations() {
        let (mut session, events) = recorded(session_with(vec![FACE_A]));
        let face = session.detect(colorful_frame()).unwrap()[0];
        session.blur(face, 1.0).unwrap();
        session.apply_filters().unwrap();

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                FilterEvent::FacesDetected {
                    frame_index: 0,
                    count: 1
                },
                FilterEvent::FilterQueued {
                    face,
                    filter: "blur(1)".to_string()
                },
                FilterEvent::FiltersApplied {
                    faces: 1,
                    filters: 1
                },
            ]
        );
    }

    #[test]
    fn test_clear_faces_forgets_everything() {
        let mut session = session_with(vec![FACE_A, FACE_B]);
        session.detect(colorful_frame()).unwrap();
        session.clear_faces();
        assert_eq!(session.face_count(), 0);
        assert_eq!(session.faces().len(), 0);
        assert!(session.image().is_some());
    }

    #[test]
    fn test_color_pop_failure_is_reported() {
        let (mut session, events) = recorded(FaceFilterSession::new(
            Box::new(FixedFaceDetector::new(Vec::new())),
            Box::new(FailingRenderer),
        ));
        session.set_image(colorful_frame());
        assert!(matches!(session.color_pop(), Err(SessionError::Greyscale(_))));
        assert_eq!(error_operations(&events), vec!["color_pop"]);
        assert_eq!(session.image(), Some(&colorful_frame()));
    }

    #[test]
    fn test_take_image_empties_session() {
        let mut session = session_with(Vec::new());
        session.set_image(colorful_frame());
        assert_eq!(session.take_image(), Some(colorful_frame()));
        assert!(session.image().is_none());
    }
}
