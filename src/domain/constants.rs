//! 사이트 특성 및 도메인 상수들
//!
//! Fixed facts about the National Palace Museum open-data site. Anything a
//! user may want to override lives in `infrastructure::config` instead.

/// Origin site constants
pub mod site {
    /// 사이트 기본 URL
    pub const BASE_URL: &str = "https://digitalarchive.npm.gov.tw";

    /// Catalog search endpoint used by the URL harvester
    pub const SEARCH_PATH: &str = "/opendata/Pub/Search";

    /// Detail page URL segment carrying the numeric artifact id
    pub const DETAIL_SEGMENT: &str = "Detail/";
}

/// CAPTCHA-gated download endpoints.
///
/// Parameter names are server-mandated, including the `capchaCode` misspelling.
pub mod download {
    /// Returns a fresh single-use CAPTCHA image bound to the session
    pub const CAPTCHA_PATH: &str = "/opendata/Image/GetCaptchaImageFor600";

    /// Validates a CAPTCHA guess and issues download parameters
    pub const VALIDATION_PATH: &str = "/opendata/Image/DownloadDialog600";

    /// Streams the image once validated
    pub const IMAGE_PATH: &str = "/opendata/Image/Download600";

    /// Department code sent with every validation request
    pub const DEPARTMENT: &str = "U";

    pub mod form {
        pub const IMAGE_ID: &str = "ImageId";
        pub const DEPARTMENT: &str = "Dep";
        pub const RANDOM_CODE: &str = "RandomCode";
        pub const ITEM_ID: &str = "ItemId";
        pub const CAPTCHA_CODE: &str = "CaptchaCode";
    }

    pub mod query {
        pub const IMAGE_ID: &str = "imageId";
        pub const DEPARTMENT: &str = "dept";
        pub const CID: &str = "cid";
        pub const CAPTCHA_CODE: &str = "capchaCode";
        pub const CODE: &str = "code";
    }
}

/// CAPTCHA character set
pub mod captcha {
    /// CAPTCHAs are a single line of uppercase letters and digits
    pub const CHAR_WHITELIST: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

    /// Tesseract page segmentation mode: treat the image as one text line
    pub const PAGE_SEGMENTATION_MODE: &str = "7";
}

/// Detail page markup
pub mod markup {
    /// Script reference carrying the item id
    pub const ITEM_ID_PATTERN: &str = r"GetJson\?cid=(\d+)";

    /// Gallery image tags
    pub const GALLERY_IMAGE_SELECTOR: &str = "div#gallery img";

    pub const IMAGE_NAME_ATTR: &str = "data-image-name";
    pub const IMAGE_ID_ATTR: &str = "data-image-id";
    pub const IMAGE_CODE_ATTR: &str = "data-image-code";

    /// File extension every archived image is saved under
    pub const IMAGE_EXTENSION: &str = "jpg";
}
