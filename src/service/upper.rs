//! Upper-casing service

use std::convert::Infallible;

use crate::dispatch::{DispatchResult, Dispatcher};
use crate::protocol::{Registry, UpperReply, UpperRequest};

/// Convert the request text to upper case
pub fn upper(request: UpperRequest) -> Result<UpperReply, Infallible> {
    Ok(UpperReply {
        result: request.text.to_uppercase(),
    })
}

/// Dispatcher serving [`UpperRequest`]
pub fn upper_dispatcher() -> DispatchResult<Dispatcher> {
    let mut dispatcher = Dispatcher::new(Registry::upper());
    dispatcher.on(upper)?;
    Ok(dispatcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Message, RecipeCreateRequest};

    fn call(text: &str) -> String {
        upper(UpperRequest {
            text: text.to_string(),
        })
        .unwrap()
        .result
    }

    #[test]
    fn test_upper() {
        assert_eq!(call("hello"), "HELLO");
        assert_eq!(call(""), "");
        assert_eq!(call("MiXeD 123 !?"), "MIXED 123 !?");
    }

    #[test]
    fn test_upper_unicode() {
        assert_eq!(call("straße"), "STRASSE");
        assert_eq!(call("ǆ"), "Ǆ");
    }

    #[test]
    fn test_dispatcher_rejects_atelier_requests() {
        let dispatcher = upper_dispatcher().unwrap();
        let reply = dispatcher.dispatch(Message::RecipeCreateRequest(RecipeCreateRequest::new(
            "sparkling powder",
            "red dye",
        )));
        assert_eq!(reply, Message::exception("unknown message"));
    }
}
