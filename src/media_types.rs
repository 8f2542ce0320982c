//! Media types per format: the commonly used one first, then official,
//! compatible, or unregistered alternatives.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::Format;

pub(crate) fn media_types(format: Format) -> &'static [&'static str] {
    match format {
        Format::Apng => &["image/apng", "image/vnd.mozilla.apng"],
        Format::Avif => &["image/avif"],
        Format::Bmp => &["image/bmp"],
        Format::Cur => &["image/vnd.microsoft.icon"],
        Format::Emf => &["image/emf"],
        Format::Gif => &["image/gif"],
        Format::Heic => &["image/heic", "image/heif"],
        Format::Ico => &["image/x-icon", "image/vnd.microsoft.icon"],
        Format::J2c => &["image/j2c"],
        Format::Jp2 => &["image/jp2"],
        Format::Jpeg => &["image/jpeg"],
        Format::Jpx => &["image/jpx"],
        Format::Mng => &["video/x-mng", "image/x-mng"],
        Format::Pam => &["image/x-portable-arbitrarymap"],
        Format::Pbm => &["image/x-portable-bitmap", "image/x-portable-anymap"],
        Format::Pcx => &["image/x-pcx", "image/vnd.zbrush.pcx"],
        Format::Pgm => &["image/x-portable-graymap", "image/x-portable-anymap"],
        Format::Png => &["image/png"],
        Format::Ppm => &["image/x-portable-pixmap", "image/x-portable-anymap"],
        Format::Psd => &["image/vnd.adobe.photoshop"],
        Format::Svg => &["image/svg+xml"],
        Format::Swf => &["application/x-shockwave-flash", "application/vnd.adobe.flash.movie"],
        Format::Tiff => &["image/tiff"],
        Format::Webp => &["image/webp"],
        Format::Xbm => &["image/x-xbitmap"],
        Format::Xpm => &["image/x-xpixmap"],
    }
}
