//! Plain-text feature extraction: a 6-key vector covering length,
//! entropy, word/digit counts and embedded address/URL detection.

use crate::entropy::shannon_entropy;
use crate::features::FeatureVector;
use regex::Regex;

pub struct TextFeatures {
    text: String,
    email_regex: Regex,
    url_regex: Regex,
}

impl TextFeatures {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            email_regex: Regex::new(
                r"(?i)[a-z0-9!#$%&'*+/=?^_`{|}~.-]+@(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z]{2,}",
            )
            .unwrap(),
            url_regex: Regex::new(
                r"(?ix)\b(
                    https?://[^\s<>]+
                  | www\.[a-z0-9][a-z0-9.-]*\.[a-z]{2,}(?:/[^\s<>]*)?
                  | [a-z0-9][a-z0-9.-]*\.(?:com|net|org|edu|gov|mil|info|biz|io|co|us|uk|de|fr|ru|cn|jp|br|in|au|ca|eu|online|xyz|top|site|club|shop|live|app)(?:/[^\s<>]*)?
                )",
            )
            .unwrap(),
        }
    }

    fn words_num(&self) -> usize {
        // Split on single spaces, matching the schema the text classifier
        // was trained against. Runs of whitespace undercount on purpose.
        self.text.split(' ').count()
    }

    fn digits_num(&self) -> usize {
        self.text.chars().filter(|c| c.is_ascii_digit()).count()
    }

    pub fn extract(&self) -> FeatureVector {
        let mut fv = FeatureVector::with_capacity(6);
        fv.push_flag("has_email", self.email_regex.is_match(&self.text));
        fv.push_flag("has_url", self.url_regex.is_match(&self.text));
        fv.push_count("length", self.text.len());
        fv.push("entropy", shannon_entropy(&self.text.to_lowercase()));
        fv.push_count("words_num", self.words_num());
        fv.push_count("digits_num", self.digits_num());
        fv
    }
}

pub fn extract(text: &str) -> FeatureVector {
    TextFeatures::new(text).extract()
}
