use logos::Logos;

/// Token types for the HTML subset produced by generators and the exporter
#[derive(Logos, Debug, Clone, PartialEq)]
pub enum HtmlToken<'src> {
    // <!DOCTYPE ...>, <!-- ... -->, <?xml ...?>
    #[regex(r"<[!?][^>]*>")]
    Declaration,

    #[regex(r"</[^>]*>", |lex| tag_name(lex.slice()))]
    EndTag(String),

    #[regex(r"<[a-zA-Z][^>]*>", |lex| tag_name(lex.slice()))]
    StartTag(String),

    #[regex(r"&[a-zA-Z]+;|&#[0-9]+;|&#[xX][0-9a-fA-F]+;", |lex| lex.slice())]
    Entity(&'src str),

    #[regex(r"[^<&]+", |lex| lex.slice())]
    Text(&'src str),
}

/// Lowercased element name of a start or end tag
fn tag_name(slice: &str) -> String {
    slice
        .trim_start_matches('<')
        .trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Tokenize markup; stray `<` or `&` come back as text
pub fn tokenize(source: &str) -> Vec<HtmlToken<'_>> {
    let mut lexer = HtmlToken::lexer(source);
    let mut tokens = Vec::new();
    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push(token),
            Err(()) => tokens.push(HtmlToken::Text(lexer.slice())),
        }
    }
    tokens
}

/// Decode a character reference; unknown names are kept verbatim
pub fn decode_entity(entity: &str) -> String {
    let name = entity.trim_start_matches('&').trim_end_matches(';');

    if let Some(number) = name.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => number.parse::<u32>().ok(),
        };
        return code
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| entity.to_string());
    }

    let decoded = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "ensp" => '\u{2002}',
        "emsp" => '\u{2003}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "mdash" => '\u{2014}',
        _ => return entity.to_string(),
    };
    decoded.to_string()
}
