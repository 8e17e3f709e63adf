use pdf_ai_audio_rust::AnalysisKind;
use pdf_ai_audio_rust::analysis::build_prompt;
use pdf_ai_audio_rust::settings::Instructions;

#[test]
fn action_items_prompt() {
    let instructions = Instructions::default();
    let prompt = build_prompt(
        instructions.for_kind(AnalysisKind::ActionItems),
        "Verbale riunione\nBuy milk. Call Bob.",
    );
    insta::assert_snapshot!(prompt);
}
