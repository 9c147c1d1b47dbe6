use wasm_bindgen::prelude::Closure;
use wasm_bindgen::{JsCast, JsValue};

use crate::error::SensorError;
use crate::stream::{no_teardown, SensorStream};
use crate::util::{self, describe, js_number, js_string};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Radius of the 95% confidence circle, in metres.
    pub accuracy: f64,
    /// Milliseconds since the epoch.
    pub timestamp: f64,
}

impl Position {
    fn extract(position: &JsValue) -> Option<Self> {
        let coords = js_sys::Reflect::get(position, &JsValue::from_str("coords")).ok()?;
        Some(Position {
            latitude: js_number(&coords, "latitude")?,
            longitude: js_number(&coords, "longitude")?,
            accuracy: js_number(&coords, "accuracy").unwrap_or(f64::NAN),
            timestamp: js_number(position, "timestamp").unwrap_or_else(util::now_ms),
        })
    }
}

/// Every position update from `navigator.geolocation.watchPosition`.
pub fn geolocation() -> SensorStream<Position> {
    SensorStream::new(|emitter| {
        let geolocation = match util::window().and_then(|window| {
            window
                .navigator()
                .geolocation()
                .map_err(|_| SensorError::Unsupported("geolocation"))
        }) {
            Ok(geolocation) => geolocation,
            Err(err) => {
                emitter.fail(err);
                return no_teardown();
            }
        };

        let tx = emitter.clone();
        let on_position = Closure::<dyn FnMut(JsValue)>::new(move |position: JsValue| {
            match Position::extract(&position) {
                Some(position) => {
                    tx.next(position);
                }
                None => log::warn!("ignoring malformed position {}", describe(&position)),
            }
        });

        let tx = emitter.clone();
        let on_error = Closure::<dyn FnMut(JsValue)>::new(move |err: JsValue| {
            let reason = js_string(&err, "message").unwrap_or_else(|| describe(&err));
            tx.fail(SensorError::acquisition("geolocation", reason));
        });

        let watch = geolocation.watch_position_with_error_callback(
            on_position.as_ref().unchecked_ref(),
            Some(on_error.as_ref().unchecked_ref()),
        );

        match watch {
            Ok(id) => {
                log::debug!("watching position ({})", id);
                Box::new(move || {
                    geolocation.clear_watch(id);
                    drop((on_position, on_error));
                    log::debug!("cleared position watch ({})", id);
                })
            }
            Err(err) => {
                emitter.fail(SensorError::acquisition("geolocation", describe(&err)));
                no_teardown()
            }
        }
    })
}

