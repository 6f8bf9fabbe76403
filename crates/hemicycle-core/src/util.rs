use chrono::NaiveDate;

const MONTHS: [&str; 12] = [
    "janvier",
    "fevrier",
    "mars",
    "avril",
    "mai",
    "juin",
    "juillet",
    "aout",
    "septembre",
    "octobre",
    "novembre",
    "decembre",
];

/// Find the first date written in `text`.
///
/// Accepts `dd/mm/yyyy` and long French forms such as `1er mars 2024` or
/// `12 décembre 2023`, anywhere in the string.
pub fn find_date(text: &str) -> Option<NaiveDate> {
    let tokens: Vec<String> = text
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| c == ',' || c == '.' || c == '(' || c == ')'))
        .map(fold)
        .collect();

    for (i, token) in tokens.iter().enumerate() {
        if let Ok(date) = NaiveDate::parse_from_str(token, "%d/%m/%Y") {
            return Some(date);
        }

        let Some(day) = parse_day(token) else {
            continue;
        };
        let (Some(month), Some(year)) = (tokens.get(i + 1), tokens.get(i + 2)) else {
            continue;
        };
        let Some(month) = MONTHS.iter().position(|m| m == month) else {
            continue;
        };
        let Ok(year) = year.parse::<i32>() else {
            continue;
        };
        if let Some(date) = NaiveDate::from_ymd_opt(year, month as u32 + 1, day) {
            return Some(date);
        }
    }
    None
}

fn parse_day(token: &str) -> Option<u32> {
    let digits = token.strip_suffix("er").unwrap_or(token);
    let day: u32 = digits.parse().ok()?;
    (1..=31).contains(&day).then_some(day)
}

/// Lower-case, strip French diacritics and collapse separators.
///
/// `"Jean-Luc  Mélenchon"` and `"jean luc melenchon"` normalize identically.
pub fn normalize_name(name: &str) -> String {
    fold(name)
        .split(|c: char| c.is_whitespace() || c == '-' || c == '\'' || c == '’')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'à' | 'â' | 'ä' => 'a',
            'ç' => 'c',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'î' | 'ï' => 'i',
            'ô' | 'ö' => 'o',
            'ù' | 'û' | 'ü' => 'u',
            'ÿ' => 'y',
            other => other,
        })
        .collect()
}

/// Replace `{key}` placeholders in a URL template.
pub fn fill_template(template: &str, params: &[(&str, &str)]) -> String {
    params
        .iter()
        .fold(template.to_string(), |url, (key, value)| {
            url.replace(&format!("{{{key}}}"), value)
        })
}
