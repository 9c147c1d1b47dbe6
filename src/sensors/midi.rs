use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::EventTarget;

use crate::error::SensorError;
use crate::stream::{Emitter, SensorStream};
use crate::util::{self, describe, js_string, EventListener};

/// One message from a MIDI input port.
#[derive(Clone, Debug, PartialEq)]
pub struct MidiMessage {
    /// Port name, or its id when the device reports no name.
    pub port: String,
    /// Raw status and data bytes.
    pub data: Vec<u8>,
    /// `DOMHighResTimeStamp` of the event.
    pub timestamp: f64,
}

impl MidiMessage {
    pub fn status(&self) -> Option<u8> {
        self.data.first().copied()
    }

    /// Channel 0..=15 of a channel voice message.
    pub fn channel(&self) -> Option<u8> {
        self.status().filter(|status| (0x80..0xF0).contains(status)).map(|status| status & 0x0F)
    }
}

#[derive(Default)]
struct MidiSession {
    closed: bool,
    listeners: Vec<EventListener>,
}

impl MidiSession {
    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.listeners.clear();
        log::debug!("midi session closed");
    }
}

/// Messages from every MIDI input present when access is granted.
pub fn midi() -> SensorStream<MidiMessage> {
    SensorStream::new(|emitter| {
        let session = Rc::new(RefCell::new(MidiSession::default()));
        let task = session.clone();

        spawn_local(async move {
            if let Err(err) = listen(&emitter, &task).await {
                task.borrow_mut().close();
                emitter.fail(err);
            }
        });

        Box::new(move || session.borrow_mut().close())
    })
}

async fn listen(emitter: &Emitter<MidiMessage>, session: &Rc<RefCell<MidiSession>>) -> Result<(), SensorError> {
    let navigator: JsValue = util::window()?.navigator().into();
    let request = js_sys::Reflect::get(&navigator, &JsValue::from_str("requestMIDIAccess"))
        .ok()
        .and_then(|request| request.dyn_into::<js_sys::Function>().ok())
        .ok_or(SensorError::Unsupported("midi"))?;

    let promise = request
        .call0(&navigator)
        .map_err(|err| SensorError::acquisition("midi", describe(&err)))?;
    let access = JsFuture::from(js_sys::Promise::from(promise))
        .await
        .map_err(|err| SensorError::acquisition("midi", describe(&err)))?;

    if session.borrow().closed {
        return Ok(());
    }

    let inputs = js_sys::Reflect::get(&access, &JsValue::from_str("inputs"))
        .map_err(|err| SensorError::acquisition("midi", describe(&err)))?;

    // MIDIInputMap is only map-like, so it is never an instance of Map.
    let inputs: js_sys::Map = inputs.unchecked_into();
    let mut failure = None;
    inputs.for_each(&mut |input, id| {
        if failure.is_some() {
            return;
        }
        let port = js_string(&input, "name")
            .filter(|name| !name.is_empty())
            .or_else(|| id.as_string())
            .unwrap_or_default();

        match attach(emitter, input, port) {
            Ok(listener) => session.borrow_mut().listeners.push(listener),
            Err(err) => failure = Some(err),
        }
    });

    if let Some(err) = failure {
        return Err(err);
    }
    log::debug!("listening to {} midi inputs", session.borrow().listeners.len());
    Ok(())
}

fn attach(emitter: &Emitter<MidiMessage>, input: JsValue, port: String) -> Result<EventListener, SensorError> {
    let target: EventTarget = input
        .dyn_into()
        .map_err(|input| SensorError::acquisition("midi", format!("{} is not an input port", describe(&input))))?;

    let tx = emitter.clone();
    EventListener::new(&target, "midimessage", move |event| {
        let data = js_sys::Reflect::get(&event, &JsValue::from_str("data"))
            .ok()
            .filter(|data| !data.is_undefined() && !data.is_null())
            .map(|data| js_sys::Uint8Array::new(&data).to_vec())
            .unwrap_or_default();

        tx.next(MidiMessage {
            port: port.clone(),
            data,
            timestamp: event.time_stamp(),
        });
    })
    .map_err(|err| SensorError::acquisition("midi", describe(&err)))
}
