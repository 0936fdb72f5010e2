//! Report text and date formatting (pt-BR).

use chrono::{Datelike, NaiveDate, Weekday};
use rollcall_core::types::Participant;

use crate::tally::TallyResult;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━";

/// Weekday name in Portuguese.
pub fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Sun => "Domingo",
        Weekday::Mon => "Segunda-feira",
        Weekday::Tue => "Terça-feira",
        Weekday::Wed => "Quarta-feira",
        Weekday::Thu => "Quinta-feira",
        Weekday::Fri => "Sexta-feira",
        Weekday::Sat => "Sábado",
    }
}

/// dd/mm/yyyy
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

fn push_section(out: &mut String, title: &str, members: &[Participant]) {
    out.push_str(&format!("{} ({}):*\n", title, members.len()));
    if members.is_empty() {
        out.push_str("_Nenhum_\n");
    } else {
        for p in members {
            out.push_str(&format!("📱 {}\n", p.handle));
        }
    }
    out.push('\n');
}

/// Result message posted to the group at the end of a cycle.
pub fn format_report(result: &TallyResult, date: NaiveDate) -> String {
    let mut out = String::new();
    out.push_str("📊 *RESULTADO DA TIRAGEM DE FALTA* 📊\n\n");
    out.push_str(&format!("📅 *{}* - {}\n\n", weekday_name(date), format_date(date)));
    out.push_str(RULE);
    out.push_str("\n\n");

    push_section(&mut out, "✅ *PRESENTES", &result.present);
    push_section(&mut out, "❌ *AUSENTES", &result.absent);
    push_section(&mut out, "🏥 *ATESTADO/JUSTIFICATIVA", &result.excused);

    if result.unanswered.is_empty() {
        out.push_str("Todos responderam! 🎉\n\n");
    } else {
        out.push_str(&format!("⚠️ *NÃO RESPONDERAM ({}):*\n", result.unanswered.len()));
        for p in &result.unanswered {
            out.push_str(&format!("📱 {}\n", p.handle));
        }
        out.push_str(&format!(
            "_{} pessoa(s) não responderam_\n\n",
            result.unanswered.len()
        ));
    }

    out.push_str(RULE);
    out.push_str("\n\n");
    out.push_str(&format!(
        "📈 *RESUMO:* {}/{} responderam",
        result.responded_count(),
        result.total()
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::config::{ResponseChannelKind, UnansweredPolicy};
    use rollcall_core::types::Classification;
    use std::collections::HashMap;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[test]
    fn test_weekday_and_date() {
        assert_eq!(weekday_name(date()), "Sexta-feira");
        assert_eq!(weekday_name(NaiveDate::from_ymd_opt(2026, 10, 13).unwrap()), "Terça-feira");
        assert_eq!(format_date(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()), "02/03/2026");
    }

    #[test]
    fn test_report_lists_every_bucket() {
        let roster: Vec<Participant> = ["551100000001@c.us", "551100000002@c.us", "551100000003@c.us"]
            .into_iter()
            .map(Participant::new)
            .collect();
        let signals: HashMap<String, Classification> = [
            ("551100000001@c.us".to_string(), Classification::Present),
            ("551100000002@c.us".to_string(), Classification::Absent),
        ]
        .into_iter()
        .collect();
        let result = TallyResult::partition(
            "g@g.us",
            ResponseChannelKind::Reaction,
            &roster,
            &signals,
            UnansweredPolicy::Absent,
        );

        let text = format_report(&result, date());
        assert!(text.starts_with("📊 *RESULTADO DA TIRAGEM DE FALTA* 📊"));
        assert!(text.contains("📅 *Sexta-feira* - 16/10/2026"));
        assert!(text.contains("✅ *PRESENTES (1):*\n📱 551100000001\n"));
        assert!(text.contains("❌ *AUSENTES (2):*\n📱 551100000002\n📱 551100000003\n"));
        assert!(text.contains("🏥 *ATESTADO/JUSTIFICATIVA (0):*\n_Nenhum_"));
        assert!(text.contains("⚠️ *NÃO RESPONDERAM (1):*\n📱 551100000003\n"));
        assert!(text.ends_with("📈 *RESUMO:* 2/3 responderam"));
    }

    #[test]
    fn test_report_everyone_answered() {
        let roster = vec![Participant::new("a@c.us")];
        let signals: HashMap<String, Classification> =
            [("a@c.us".to_string(), Classification::Excused)].into_iter().collect();
        let result = TallyResult::partition(
            "g@g.us",
            ResponseChannelKind::Poll,
            &roster,
            &signals,
            UnansweredPolicy::NoResponse,
        );
        let text = format_report(&result, date());
        assert!(text.contains("Todos responderam! 🎉"));
        assert!(text.ends_with("1/1 responderam"));
    }
}
