//! HTML for the browser upload form.

use crate::domain::Validator;
use std::fmt::Write;

pub enum Notice<'a> {
    Success {
        video_id: &'a str,
        filename: &'a str,
        published: bool,
    },
    Error(&'a str),
}

pub fn render(validator: &Validator, notice: Option<Notice<'_>>) -> String {
    let allowed = validator.allowed_extensions();
    let mut html = String::from(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Video Upload</title>\n</head>\n<body>\n<h1>Video Upload</h1>\n",
    );

    match notice {
        Some(Notice::Success {
            video_id,
            filename,
            published,
        }) => {
            let _ = write!(
                html,
                "<div class=\"success\">\n<p>Video uploaded successfully!</p>\n\
                 <p>Video ID: <code>{}</code></p>\n<p>File: <code>{}</code></p>\n",
                escape(video_id),
                escape(filename)
            );
            if !published {
                html.push_str("<p>Processing will start once the message bus is reachable.</p>\n");
            }
            html.push_str("</div>\n");
        }
        Some(Notice::Error(message)) => {
            let _ = write!(html, "<div class=\"error\">{}</div>\n", escape(message));
        }
        None => {}
    }

    let _ = write!(
        html,
        "<form action=\"/upload-video-gui/\" method=\"post\" enctype=\"multipart/form-data\">\n\
         <input type=\"file\" name=\"file\" accept=\"{}\" required>\n\
         <button type=\"submit\">Upload</button>\n</form>\n\
         <p>Allowed formats: {}. Maximum size: {}GB.</p>\n</body>\n</html>\n",
        escape(&allowed.join(",")),
        escape(&allowed.join(", ")),
        validator.max_size_gb()
    );
    html
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
