use focus_reader::translations::{TOOL_NAME, TranslateOptions, render_system_prompt};

#[test]
fn system_prompt_snapshot() {
    let options = TranslateOptions::default();
    let prompt = render_system_prompt(&options, TOOL_NAME).unwrap();
    insta::assert_snapshot!(prompt, @r###"
    You translate short phrases for a reader who follows a highlighted passage word group by word group.
    Source language: auto (detect it). Target language: hi.
    The phrase is a fragment cut out of running text: it may start or stop mid-sentence. Translate only the words given, keep their order of meaning, do not complete the sentence and do not add commentary.
    Keep numbers, names and punctuation as they appear unless the target script requires otherwise.
    Always answer by calling the deliver_translation tool. Set target_language to "hi" and source_language to the ISO 639 code of the phrase.
    "###);
}
