/// 运营商
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Att,
    Tmobile,
    Verizon,
    Sprint,
}

/// 手机号 + 运营商，短信走运营商的邮件网关
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phone {
    pub number: String,
    pub provider: Provider,
}

impl Phone {
    pub fn new(number: impl Into<String>, provider: Provider) -> Self {
        Self {
            number: number.into(),
            provider,
        }
    }

    /// 网关邮箱；带附件时用 MMS 域名
    pub fn gateway_email(&self, attachments: bool) -> String {
        let domain = match (self.provider, attachments) {
            (Provider::Att, false) => "txt.att.net",
            (Provider::Att, true) => "mms.att.net",
            (Provider::Tmobile, _) => "tmomail.net",
            (Provider::Verizon, false) => "vtext.com",
            (Provider::Verizon, true) => "vzwpix.com",
            (Provider::Sprint, _) => "pm.sprint.com",
        };
        format!("{}@{}", self.number, domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_email_sms_vs_mms() {
        let phone = Phone::new("5551234567", Provider::Att);
        assert_eq!(phone.gateway_email(false), "5551234567@txt.att.net");
        assert_eq!(phone.gateway_email(true), "5551234567@mms.att.net");
    }

    #[test]
    fn test_gateway_email_verizon() {
        let phone = Phone::new("5550000000", Provider::Verizon);
        assert_eq!(phone.gateway_email(false), "5550000000@vtext.com");
        assert_eq!(phone.gateway_email(true), "5550000000@vzwpix.com");
    }
}
