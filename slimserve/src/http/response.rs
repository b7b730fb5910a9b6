use crate::utils::Buffer;

use bytes::Bytes;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Status codes the handler produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    Forbidden,
    NotFound,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::Forbidden => 403,
            Status::NotFound => 404,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::BadRequest => "Bad Request",
            Status::Forbidden => "Forbidden",
            Status::NotFound => "Not Found",
        }
    }

    /// Document served in place of the requested one.
    fn error_page(self) -> Option<&'static str> {
        match self {
            Status::Ok => None,
            Status::BadRequest => Some("/400.html"),
            Status::Forbidden => Some("/403.html"),
            Status::NotFound => Some("/404.html"),
        }
    }
}

/// MIME type for a path, by extension; `text/plain` when unknown.
pub fn content_type(path: &str) -> &'static str {
    let Some((_, ext)) = path.rsplit_once('.') else {
        return "text/plain";
    };

    match ext {
        "html" => "text/html",
        "xml" => "text/xml",
        "xhtml" => "application/xhtml+xml",
        "txt" => "text/plain",
        "rtf" => "application/rtf",
        "pdf" => "application/pdf",
        "word" => "application/nsword",
        "png" => "image/png",
        "gif" => "image/gif",
        "jpg" | "jpeg" => "image/jpeg",
        "au" => "audio/basic",
        "mpeg" | "mpg" => "video/mpeg",
        "avi" => "video/x-msvideo",
        "gz" => "application/x-gzip",
        "tar" => "application/x-tar",
        "css" => "text/css",
        "js" => "text/javascript",
        _ => "text/plain",
    }
}

/// Classifies `root + path`: missing files and directories are 404, files
/// other users may not read are 403.
fn classify(root: &Path, path: &str) -> Status {
    match fs::metadata(root.join(path.trim_start_matches('/'))) {
        Ok(meta) if meta.is_dir() => Status::NotFound,
        Ok(meta) if meta.permissions().mode() & 0o004 == 0 => Status::Forbidden,
        Ok(_) => Status::Ok,
        Err(_) => Status::NotFound,
    }
}

fn error_body(status: Status, message: &str) -> Bytes {
    Bytes::from(format!(
        "<html><title>Error</title><body bgcolor=\"ffffff\">{} : {}\n<p>{}</p><hr><em>SlimServe</em></body></html>",
        status.code(),
        status.reason(),
        message,
    ))
}

/// Writes the response head for `path` into `output` and returns the body.
///
/// With `status` unset, the file decides between 200, 403 and 404. Error
/// statuses serve their error document when it exists under `root`, else
/// an inline page.
pub fn render(
    root: &Path,
    path: &str,
    status: Option<Status>,
    keep_alive: bool,
    output: &mut Buffer,
) -> (Status, Bytes) {
    let status = status.unwrap_or_else(|| classify(root, path));
    let path = status.error_page().unwrap_or(path);

    let body = match fs::read(root.join(path.trim_start_matches('/'))) {
        Ok(contents) => Bytes::from(contents),
        Err(_) => error_body(status, "File Not Found!"),
    };

    output.append_str(&format!(
        "HTTP/1.1 {} {}\r\n",
        status.code(),
        status.reason()
    ));

    if keep_alive {
        output.append_str("Connection: keep-alive\r\nKeep-Alive: max=6, timeout=120\r\n");
    } else {
        output.append_str("Connection: close\r\n");
    }

    output.append_str(&format!(
        "Content-Type: {}\r\nContent-Length: {}\r\n\r\n",
        content_type(path),
        body.len()
    ));

    (status, body)
}
