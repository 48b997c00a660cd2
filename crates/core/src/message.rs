//! カウントダウン文面の生成。
//!
//! 単数・複数の語形選択は [`PluralRule`] に切り出してあり、言語ごとに差し替えられる。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::date::{TzOffset, daily_phrase};

/// 語形のカテゴリ。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluralCategory {
    One,
    Few,
    Many,
}

/// 数から語形カテゴリを選ぶ規則。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluralRule {
    /// 1 とそれ以外。
    #[default]
    English,
    /// 下 1 桁・下 2 桁で one / few / many を選ぶスラブ系の規則 (1 день, 2 дня, 5 дней)。
    Slavic,
}

impl PluralRule {
    /// 負の数は絶対値で判定する。
    pub fn category(self, count: i64) -> PluralCategory {
        let n = count.unsigned_abs();
        match self {
            PluralRule::English => {
                if n == 1 {
                    PluralCategory::One
                } else {
                    PluralCategory::Many
                }
            }
            PluralRule::Slavic => {
                let (n10, n100) = (n % 10, n % 100);
                if n10 == 1 && n100 != 11 {
                    PluralCategory::One
                } else if (2..=4).contains(&n10) && !(12..=14).contains(&n100) {
                    PluralCategory::Few
                } else {
                    PluralCategory::Many
                }
            }
        }
    }
}

/// 「日」の語形。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayForms {
    pub one: String,
    pub few: String,
    pub many: String,
}

impl Default for DayForms {
    fn default() -> Self {
        Self {
            one: "day".to_string(),
            few: "days".to_string(),
            many: "days".to_string(),
        }
    }
}

impl DayForms {
    pub fn get(&self, category: PluralCategory) -> &str {
        match category {
            PluralCategory::One => &self.one,
            PluralCategory::Few => &self.few,
            PluralCategory::Many => &self.many,
        }
    }
}

/// カウントダウン文面の設定。
///
/// `template` 中の `{days}` は残り日数、`{word}` は語形に置き換えられる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageFormat {
    pub template: String,
    pub plural: PluralRule,
    /// 日替わりで 2 行目に付けるフレーズ。空なら付けない。
    pub phrases: Vec<String>,
    pub day_forms: DayForms,
}

impl Default for MessageFormat {
    fn default() -> Self {
        Self {
            template: "{days} {word} left until the big day. Or maybe not so big, we'll see."
                .to_string(),
            plural: PluralRule::default(),
            phrases: [
                "If everyone shows up on time",
                "If the weather says yes",
                "If everything lines up just right",
                "If the driver finds the right turn",
                "If the playlist hits from the first track",
                "If the coffee is strong",
                "If the jokes land",
                "If luck is on our side",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            day_forms: DayForms::default(),
        }
    }
}

impl MessageFormat {
    /// 残り日数の 1 行目。
    pub fn main_line(&self, days: i64) -> String {
        let word = self.day_forms.get(self.plural.category(days));
        self.template
            .replace("{days}", &days.to_string())
            .replace("{word}", word)
    }

    /// 1 行目と日替わりフレーズを合わせた通知本文。
    pub fn countdown(&self, days: i64, offset: TzOffset, now: DateTime<Utc>) -> String {
        let main = self.main_line(days);
        match daily_phrase(&self.phrases, offset, now) {
            Some(phrase) => format!("{main}\n{phrase}"),
            None => main,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn russian() -> MessageFormat {
        MessageFormat {
            template: "До встречи осталось {days} {word}.".to_string(),
            plural: PluralRule::Slavic,
            phrases: vec![],
            day_forms: DayForms {
                one: "день".to_string(),
                few: "дня".to_string(),
                many: "дней".to_string(),
            },
        }
    }

    #[test]
    fn slavic_categories() {
        use PluralCategory::*;

        let cases = [
            (0, Many),
            (1, One),
            (2, Few),
            (4, Few),
            (5, Many),
            (11, Many),
            (12, Many),
            (14, Many),
            (21, One),
            (22, Few),
            (111, Many),
            (112, Many),
            (121, One),
            (-1, One),
            (-3, Few),
        ];
        for (n, expected) in cases {
            assert_eq!(PluralRule::Slavic.category(n), expected, "n = {n}");
        }
    }

    #[test]
    fn english_categories() {
        assert_eq!(PluralRule::English.category(1), PluralCategory::One);
        assert_eq!(PluralRule::English.category(-1), PluralCategory::One);
        assert_eq!(PluralRule::English.category(0), PluralCategory::Many);
        assert_eq!(PluralRule::English.category(2), PluralCategory::Many);
    }

    #[test]
    fn main_line_inflects_russian() {
        let format = russian();
        assert_eq!(format.main_line(1), "До встречи осталось 1 день.");
        assert_eq!(format.main_line(3), "До встречи осталось 3 дня.");
        assert_eq!(format.main_line(9), "До встречи осталось 9 дней.");
        assert_eq!(format.main_line(13), "До встречи осталось 13 дней.");
    }

    #[test]
    fn main_line_inflects_english() {
        let format = MessageFormat {
            template: "{days} {word} to go".to_string(),
            ..Default::default()
        };
        assert_eq!(format.main_line(1), "1 day to go");
        assert_eq!(format.main_line(0), "0 days to go");
        assert_eq!(format.main_line(-2), "-2 days to go");
    }

    #[test]
    fn countdown_appends_phrase_of_the_day() {
        let now = DateTime::parse_from_rfc3339("2025-01-02T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let format = MessageFormat {
            phrases: vec!["even".to_string(), "odd".to_string()],
            ..russian()
        };
        assert_eq!(
            format.countdown(5, TzOffset::utc(), now),
            "До встречи осталось 5 дней.\neven"
        );
        assert_eq!(
            russian().countdown(5, TzOffset::utc(), now),
            "До встречи осталось 5 дней."
        );
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let format: MessageFormat = serde_json::from_str(r#"{"plural":"slavic"}"#).unwrap();
        assert_eq!(format.plural, PluralRule::Slavic);
        assert_eq!(format.template, MessageFormat::default().template);
    }
}
