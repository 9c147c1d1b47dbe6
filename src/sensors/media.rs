//! Camera and microphone streams.
//!
//! Both are [`Shared`]: every subscriber sees the same device, the permission
//! prompt appears once, and the tracks stop when the last subscriber leaves.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{
    AudioContext, CanvasRenderingContext2d, Document, HtmlCanvasElement, HtmlVideoElement, MediaStream,
    MediaStreamConstraints, MediaStreamTrack, Window,
};

use super::browser_scheduler;
use crate::cadence::{start_cadence, Cadence};
use crate::error::SensorError;
use crate::stream::{no_teardown, Emitter, Shared, Teardown};
use crate::util::{self, describe, EventListener};

/// One RGBA camera frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SightOptions {
    pub framerate: f64,
    /// Output width in pixels; height follows the camera's aspect ratio.
    pub width: u32,
}

impl SightOptions {
    pub fn validate(&self) -> Result<(), SensorError> {
        if self.width == 0 {
            return Err(SensorError::Configuration("frame width must be at least one pixel".into()));
        }
        Ok(())
    }
}

impl Default for SightOptions {
    fn default() -> Self {
        SightOptions {
            framerate: 0.0,
            width: 320,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SoundOptions {
    pub framerate: f64,
    /// Analyser FFT size; each frame holds `fft_size / 2` samples.
    pub fft_size: u32,
}

impl SoundOptions {
    pub const MIN_FFT_SIZE: u32 = 32;
    pub const MAX_FFT_SIZE: u32 = 32768;

    pub fn frame_len(&self) -> Result<usize, SensorError> {
        let size = self.fft_size;
        if size.is_power_of_two() && (Self::MIN_FFT_SIZE..=Self::MAX_FFT_SIZE).contains(&size) {
            Ok(size as usize / 2)
        } else {
            Err(SensorError::Configuration(format!(
                "fft size must be a power of two between {} and {}, got {}",
                Self::MIN_FFT_SIZE,
                Self::MAX_FFT_SIZE,
                size
            )))
        }
    }
}

impl Default for SoundOptions {
    fn default() -> Self {
        SoundOptions {
            framerate: 0.0,
            fft_size: 2048,
        }
    }
}

/// Camera frame geometry, known once the video can play.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureState {
    pub acquired: bool,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl CaptureState {
    pub fn fit(video_width: u32, video_height: u32, width: u32) -> Self {
        if video_width == 0 || video_height == 0 || width == 0 {
            return CaptureState::default();
        }

        let height = (f64::from(video_height) * f64::from(width) / f64::from(video_width)).round() as u32;
        CaptureState {
            acquired: height > 0,
            frame_width: width,
            frame_height: height,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Device {
    Camera,
    Microphone,
}

impl Device {
    fn name(self) -> &'static str {
        match self {
            Device::Camera => "camera",
            Device::Microphone => "microphone",
        }
    }

    fn failure(self) -> impl Fn(JsValue) -> SensorError {
        move |err| SensorError::acquisition(self.name(), describe(&err))
    }
}

/// Everything a media stream owns while connected.
#[derive(Default)]
struct MediaSession {
    closed: bool,
    stream: Option<MediaStream>,
    cadence: Option<Cadence>,
    listener: Option<EventListener>,
    audio: Option<AudioContext>,
}

impl MediaSession {
    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(cadence) = self.cadence.take() {
            cadence.stop();
        }
        self.listener = None;
        if let Some(stream) = self.stream.take() {
            stop_tracks(&stream);
        }
        if let Some(audio) = self.audio.take() {
            let _ = audio.close();
        }
        log::debug!("media session closed");
    }
}

type SessionRef = Rc<RefCell<MediaSession>>;

/// Camera frames scaled to `options.width`.
pub fn sight(options: SightOptions) -> Shared<Frame> {
    Shared::new(move |emitter| {
        if let Err(err) = options.validate() {
            emitter.fail(err);
            return no_teardown();
        }
        connect(emitter, move |emitter, session| async move {
            start_camera(options, &emitter, &session).await
        })
    })
}

/// Byte time-domain microphone frames of `fft_size / 2` samples.
pub fn sound(options: SoundOptions) -> Shared<Vec<u8>> {
    Shared::new(move |emitter| {
        if let Err(err) = options.frame_len() {
            emitter.fail(err);
            return no_teardown();
        }
        connect(emitter, move |emitter, session| async move {
            start_microphone(options, &emitter, &session).await
        })
    })
}

fn connect<T, F, Fut>(emitter: Emitter<T>, start: F) -> Teardown
where
    T: Clone + 'static,
    F: FnOnce(Emitter<T>, SessionRef) -> Fut,
    Fut: std::future::Future<Output = Result<(), SensorError>> + 'static,
{
    let session: SessionRef = Rc::new(RefCell::new(MediaSession::default()));
    let task = start(emitter.clone(), session.clone());
    let failed = session.clone();

    spawn_local(async move {
        if let Err(err) = task.await {
            failed.borrow_mut().close();
            emitter.fail(err);
        }
    });

    Box::new(move || session.borrow_mut().close())
}

async fn start_camera(
    options: SightOptions,
    emitter: &Emitter<Frame>,
    session: &SessionRef,
) -> Result<(), SensorError> {
    let device = Device::Camera;
    if session.borrow().closed {
        return Ok(());
    }
    let scheduler = browser_scheduler()?;
    let window = util::window()?;
    let document = window.document().ok_or(SensorError::Unsupported("document"))?;

    let stream = request_user_media(&window, device).await?;
    if !adopt_stream(session, &stream) {
        return Ok(());
    }

    let video: HtmlVideoElement = create_element(&document, "video")?;
    let canvas: HtmlCanvasElement = create_element(&document, "canvas")?;
    let context: CanvasRenderingContext2d = canvas
        .get_context("2d")
        .map_err(device.failure())?
        .and_then(|context| context.dyn_into().ok())
        .ok_or(SensorError::Unsupported("2d canvas"))?;

    let capture = Rc::new(Cell::new(CaptureState::default()));
    let listener = {
        let (target, canvas, capture) = (video.clone(), canvas.clone(), capture.clone());
        EventListener::new(&video, "canplay", move |_| {
            if capture.get().acquired {
                return;
            }
            let state = CaptureState::fit(target.video_width(), target.video_height(), options.width);
            if state.acquired {
                target.set_width(state.frame_width);
                target.set_height(state.frame_height);
                canvas.set_width(state.frame_width);
                canvas.set_height(state.frame_height);
                log::debug!("camera streaming at {}x{}", state.frame_width, state.frame_height);
                capture.set(state);
            }
        })
        .map_err(device.failure())?
    };

    video.set_muted(true);
    video.set_src_object(Some(&stream));
    let playing = video.play().map_err(device.failure())?;
    JsFuture::from(playing).await.map_err(device.failure())?;

    let tx = emitter.clone();
    let cadence = start_cadence(scheduler, options.framerate, move || {
        if let Some(frame) = grab_frame(&context, &video, capture.get()) {
            tx.next(frame);
        }
    })?;

    let mut session = session.borrow_mut();
    if !session.closed {
        session.listener = Some(listener);
        session.cadence = Some(cadence);
    }
    Ok(())
}

fn grab_frame(context: &CanvasRenderingContext2d, video: &HtmlVideoElement, state: CaptureState) -> Option<Frame> {
    if !state.acquired {
        return None;
    }

    let (width, height) = (f64::from(state.frame_width), f64::from(state.frame_height));
    context
        .draw_image_with_html_video_element_and_dw_and_dh(video, 0.0, 0.0, width, height)
        .ok()?;
    let image = context.get_image_data(0.0, 0.0, width, height).ok()?;

    Some(Frame {
        width: image.width(),
        height: image.height(),
        data: image.data().0,
    })
}

async fn start_microphone(
    options: SoundOptions,
    emitter: &Emitter<Vec<u8>>,
    session: &SessionRef,
) -> Result<(), SensorError> {
    let device = Device::Microphone;
    if session.borrow().closed {
        return Ok(());
    }
    let scheduler = browser_scheduler()?;
    let window = util::window()?;

    let audio = AudioContext::new().map_err(|_| SensorError::Unsupported("AudioContext"))?;
    session.borrow_mut().audio = Some(audio.clone());
    let analyser = audio.create_analyser().map_err(device.failure())?;
    analyser.set_fft_size(options.fft_size);

    let stream = request_user_media(&window, device).await?;
    if !adopt_stream(session, &stream) {
        return Ok(());
    }

    let source = audio.create_media_stream_source(&stream).map_err(device.failure())?;
    source.connect_with_audio_node(&analyser).map_err(device.failure())?;

    let mut buffer = vec![0u8; analyser.frequency_bin_count() as usize];
    let tx = emitter.clone();
    let cadence = start_cadence(scheduler, options.framerate, move || {
        analyser.get_byte_time_domain_data(&mut buffer);
        tx.next(buffer.clone());
    })?;

    let mut session = session.borrow_mut();
    if !session.closed {
        session.cadence = Some(cadence);
    }
    Ok(())
}

async fn request_user_media(window: &Window, device: Device) -> Result<MediaStream, SensorError> {
    let devices = window
        .navigator()
        .media_devices()
        .map_err(|_| SensorError::Unsupported("navigator.mediaDevices"))?;

    let constraints = MediaStreamConstraints::new();
    constraints.set_audio(&JsValue::from_bool(device == Device::Microphone));
    constraints.set_video(&JsValue::from_bool(device == Device::Camera));

    let request = devices
        .get_user_media_with_constraints(&constraints)
        .map_err(device.failure())?;
    let stream = JsFuture::from(request).await.map_err(device.failure())?;
    log::debug!("{} acquired", device.name());

    stream
        .dyn_into::<MediaStream>()
        .map_err(|value| SensorError::acquisition(device.name(), describe(&value)))
}

// Hand the device stream to the session; a session torn down during the
// permission prompt releases it straight away.
fn adopt_stream(session: &SessionRef, stream: &MediaStream) -> bool {
    let mut session = session.borrow_mut();
    if session.closed {
        stop_tracks(stream);
        return false;
    }
    session.stream = Some(stream.clone());
    true
}

fn stop_tracks(stream: &MediaStream) {
    for track in stream.get_tracks().iter() {
        if let Ok(track) = track.dyn_into::<MediaStreamTrack>() {
            track.stop();
        }
    }
}

fn create_element<T: JsCast>(document: &Document, tag: &'static str) -> Result<T, SensorError> {
    document
        .create_element(tag)
        .ok()
        .and_then(|element| element.dyn_into::<T>().ok())
        .ok_or(SensorError::Unsupported(tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_hold_half_the_fft_size() {
        let options = SoundOptions {
            fft_size: 32,
            ..SoundOptions::default()
        };
        assert_eq!(options.frame_len(), Ok(16));
        assert_eq!(SoundOptions::default().frame_len(), Ok(1024));
    }

    #[test]
    fn fft_sizes_must_be_powers_of_two_in_range() {
        for &fft_size in &[0, 16, 48, 65536] {
            let options = SoundOptions {
                fft_size,
                ..SoundOptions::default()
            };
            assert!(matches!(options.frame_len(), Err(SensorError::Configuration(_))));
        }
    }

    #[test]
    fn capture_keeps_the_camera_aspect_ratio() {
        let state = CaptureState::fit(640, 480, 320);
        assert_eq!(
            state,
            CaptureState {
                acquired: true,
                frame_width: 320,
                frame_height: 240,
            }
        );
        assert_eq!(CaptureState::fit(1920, 1080, 320).frame_height, 180);
    }

    #[test]
    fn capture_waits_for_video_dimensions() {
        assert!(!CaptureState::fit(0, 0, 320).acquired);
        assert!(!CaptureState::fit(640, 480, 0).acquired);
    }

    #[test]
    fn zero_width_frames_are_rejected() {
        let options = SightOptions {
            width: 0,
            ..SightOptions::default()
        };
        assert!(matches!(options.validate(), Err(SensorError::Configuration(_))));
        assert_eq!(SightOptions::default().validate(), Ok(()));
    }

    #[test]
    fn sight_defaults_to_320_wide_frames_at_refresh_rate() {
        let options = SightOptions::default();
        assert_eq!(options.width, 320);
        assert_eq!(options.framerate, 0.0);
    }
}
