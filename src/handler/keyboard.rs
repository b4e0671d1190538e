use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::router::CallbackPayload;

pub fn callback_button(text: &str, payload: &CallbackPayload) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text.to_string(), payload.encode())
}

pub fn get_status_keyboard(language: &str) -> InlineKeyboardMarkup {
    let refresh = CallbackPayload::command("status").with_flags(CallbackPayload::FLAG_EDITING);

    InlineKeyboardMarkup::new([
        vec![
            callback_button(&t!("buttons.status.in", locale = language), &CallbackPayload::command("in")),
            callback_button(&t!("buttons.status.out", locale = language), &CallbackPayload::command("out")),
        ],
        vec![
            callback_button(&t!("buttons.status.going", locale = language), &CallbackPayload::command("going")),
            callback_button(&t!("buttons.status.refresh", locale = language), &refresh),
        ],
    ])
}

pub fn get_in_keyboard(language: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[
        callback_button(&t!("buttons.status.out", locale = language), &CallbackPayload::command("out")),
        callback_button(&t!("buttons.status.show", locale = language), &CallbackPayload::command("status")),
    ]])
}

pub fn get_verify_keyboard(user_id: u64, language: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[callback_button(
        &t!("buttons.welcome.verify", locale = language),
        &CallbackPayload::verification(user_id),
    )]])
}
