/// How frame payloads are turned into text and back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    /// One byte per code point, U+0000 through U+00FF.
    ///
    /// Characters outside that range are written as `?`.
    #[default]
    Latin1,
    /// UTF-8, with invalid sequences replaced on decode.
    Utf8,
}

impl TextEncoding {
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            TextEncoding::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
            TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(c).unwrap_or(b'?'))
                .collect(),
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
        }
    }
}
