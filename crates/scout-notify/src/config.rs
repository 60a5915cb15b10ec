use serde::Deserialize;

use crate::sms::{Phone, Provider};

/// 发信 SMTP 配置（notify-sender.yaml）
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SenderConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 587,
            user: String::new(),
            password: String::new(),
        }
    }
}

/// 收信人配置（notify-rx.yaml）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RxConfig {
    pub email: Vec<String>,
    pub sms: SmsConfig,
}

/// 按运营商分组的手机号
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SmsConfig {
    pub verizon: Vec<String>,
    pub att: Vec<String>,
    pub tmobile: Vec<String>,
    pub sprint: Vec<String>,
}

impl RxConfig {
    pub fn phones(&self) -> Vec<Phone> {
        let mut phones = Vec::new();
        for number in &self.sms.verizon {
            phones.push(Phone::new(number.clone(), Provider::Verizon));
        }
        for number in &self.sms.att {
            phones.push(Phone::new(number.clone(), Provider::Att));
        }
        for number in &self.sms.tmobile {
            phones.push(Phone::new(number.clone(), Provider::Tmobile));
        }
        for number in &self.sms.sprint {
            phones.push(Phone::new(number.clone(), Provider::Sprint));
        }
        phones
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phones_aggregates_all_providers() {
        let rx = RxConfig {
            email: vec!["ops@example.com".to_string()],
            sms: SmsConfig {
                verizon: vec!["1".to_string()],
                att: vec!["2".to_string(), "3".to_string()],
                tmobile: vec![],
                sprint: vec!["4".to_string()],
            },
        };
        let phones = rx.phones();
        assert_eq!(phones.len(), 4);
        assert_eq!(phones[0].provider, Provider::Verizon);
        assert_eq!(phones[3].provider, Provider::Sprint);
    }
}
