//! 告警邮件的 HTML / 纯文本正文

/// 一张告警图的描述
#[derive(Debug, Clone)]
pub(crate) struct ImageInfo {
    pub name: String,
    pub time: String,
    pub attached: Vec<AttachedInfo>,
}

/// 一个落盘快照
#[derive(Debug, Clone)]
pub(crate) struct AttachedInfo {
    pub title: String,
    /// 形如 "85%"，可为空
    pub percentage: String,
    pub filename: String,
    pub full_path: std::path::PathBuf,
}

/// 邮件头里的 logo，以 `cid:` 内联
pub(crate) const LOGO_FILENAME: &str = "scout-logo.png";

pub(crate) fn alert_title(monitor_name: &str) -> String {
    format!("Scout Alert {}", monitor_name)
}

pub(crate) fn alert_text(monitor_name: &str, alert_time: &str, images: &[ImageInfo]) -> String {
    let mut body = format!("{} - {}\n", alert_title(monitor_name), alert_time);
    body.push_str(&format!("Total Images: {}\n", images.len()));
    for (index, image) in images.iter().enumerate() {
        if index > 0 {
            body.push('\n');
        }
        body.push_str(&format!("\n{}\n", image.name));
        body.push_str(&format!("Created Time: {}\n", image.time));
        for attached in &image.attached {
            if attached.percentage.is_empty() {
                body.push_str(&format!("{}\n", attached.title));
            } else {
                body.push_str(&format!("{} - {}\n", attached.title, attached.percentage));
            }
        }
    }
    body
}

pub(crate) fn alert_html(
    monitor_name: &str,
    alert_time: &str,
    images: &[ImageInfo],
    with_attachments: bool,
) -> String {
    let mut html = String::new();
    html.push_str(
        r#"<html>
<head>
    <meta name="x-apple-disable-message-reformatting">
    <style>
        body { width: 100% !important; padding: 0 !important; margin: 0 !important; font-size: 0.9rem; font-family: sans-serif; }
        .header { background-color: rgb(32, 160, 255); padding: 0.75rem; display: flow-root; }
        .logo { float: left; max-height: 5rem; margin-right: 0.75rem; }
        .title { font-size: 1.5rem; line-height: 5rem; }
        .meta { background-color: rgb(32, 160, 255); padding: 0.4rem 0.75rem; display: flow-root; }
        .meta .time { float: right; font-size: 0.75rem; }
        .section { background-color: rgb(32, 128, 255); padding: 0.4rem 0.75rem; display: flow-root; }
        .section .pct { float: right; }
        .shot { background-color: rgb(228, 228, 228); text-align: center; }
        .shot img { max-width: 100%; object-fit: contain; }
        .footer { background-color: rgb(32, 160, 255); font-size: 0.6rem; font-weight: bold; text-align: center; padding: 0.75rem; }
    </style>
</head>
<body>
"#,
    );
    html.push_str(&format!(
        "    <div class='header'><img class='logo' src='cid:{}' alt='' /><div class='title'>{}</div></div>\n",
        LOGO_FILENAME,
        alert_title(monitor_name)
    ));
    html.push_str(&format!(
        "    <div class='meta'>Total Images {}<span class='time'>{}</span></div>\n",
        images.len(),
        alert_time
    ));
    for image in images {
        html.push_str(&format!(
            "    <div class='meta'>{}<span class='time'>{}</span></div>\n",
            image.name, image.time
        ));
        for attached in &image.attached {
            if attached.percentage.is_empty() {
                html.push_str(&format!(
                    "    <div class='section'>{}</div>\n",
                    attached.title
                ));
            } else {
                html.push_str(&format!(
                    "    <div class='section'>{}<span class='pct'>{}</span></div>\n",
                    attached.title, attached.percentage
                ));
            }
            if with_attachments && !attached.filename.is_empty() {
                html.push_str(&format!(
                    "    <div class='shot'><img src='cid:{}' alt='{}' /></div>\n",
                    attached.filename, attached.filename
                ));
            }
        }
    }
    html.push_str("    <div class='footer'>Provided by Scout</div>\n</body>\n</html>\n");
    html
}
