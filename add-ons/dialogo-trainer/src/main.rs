//! Terminal sales trainer.
//!
//! Runs a training session against a randomly drawn customer persona. Text
//! mode reads turns from stdin and streams the persona's reply as it is
//! generated; voice mode (DIALOGO_VOICE=1) adds push-to-talk speech in and
//! spoken replies out.

use dialogo_core::{
    ChatBackend, HttpChatClient, ScriptedChat, SessionEngine, TrainerConfig, BUILTIN_REGISTRY,
};
use dialogo_voice::{VoiceController, VoiceEvent, VoicePhase};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env if present, before any env::var calls.
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[dialogo-trainer] .env not loaded: {e} (using system environment)");
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = TrainerConfig::from_env();
    let backend: Arc<dyn ChatBackend> = if config.api_key.is_some() {
        match HttpChatClient::from_config(&config) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                tracing::warn!(error = %e, "chat client unavailable, using scripted replies");
                Arc::new(ScriptedChat::new())
            }
        }
    } else {
        tracing::warn!(
            provider = config.provider.label(),
            "no API key configured, using scripted replies"
        );
        Arc::new(ScriptedChat::new())
    };

    tracing::info!(
        provider = config.provider.label(),
        model = %config.model,
        language = %config.language,
        "trainer starting"
    );

    let mut engine = SessionEngine::new(
        Arc::new(BUILTIN_REGISTRY.clone()),
        backend,
        config.temperature,
        config.max_tokens,
    );

    let voice_enabled = std::env::var("DIALOGO_VOICE")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if voice_enabled {
        match VoiceController::from_env(config.language.clone()) {
            Ok(voice) => {
                voice_loop(&mut engine, voice).await;
                return;
            }
            Err(e) => {
                eprintln!("{}", e.user_message());
                tracing::warn!(error = %e, "voice unavailable, falling back to text");
            }
        }
    }
    text_loop(&mut engine).await;
}

fn begin_session(engine: &mut SessionEngine) -> bool {
    match engine.start() {
        Ok(session) => {
            if let Some(persona) = &session.persona {
                println!("\n=== Nuova sessione: {} {} ===", persona.avatar, persona.name);
                println!("{}\n", persona.description);
            }
            println!("Cliente: {}\n", session.messages[0].content);
            true
        }
        Err(e) => {
            eprintln!("Impossibile avviare la sessione: {e}");
            false
        }
    }
}

fn print_traits(engine: &SessionEngine) {
    let session = engine.session();
    if session.revealed_traits.is_empty() {
        println!("Nessun tratto rilevato finora.");
        return;
    }
    println!("Tratti rilevati:");
    for (dimension, value) in session.revealed_traits.iter() {
        println!("  {:<20} {:.2}", dimension.label(), value);
    }
    if !session.trait_signals.is_empty() {
        println!("Segnali recenti:");
        for signal in session.trait_signals.iter().rev().take(5) {
            println!("  [{}] {}", signal.dimension.code(), signal.note);
        }
    }
}

/// Handle a slash command. Returns `true` when the trainer should exit.
fn handle_command(engine: &mut SessionEngine, line: &str) -> bool {
    match line {
        "/end" => match engine.end() {
            Ok(_) => {
                println!("Sessione terminata. /restart per ricominciare, /quit per uscire.");
                print_traits(engine);
            }
            Err(e) => eprintln!("{e}"),
        },
        "/restart" => {
            if engine.is_active() {
                let _ = engine.end();
            }
            begin_session(engine);
        }
        "/traits" => print_traits(engine),
        "/quit" => return true,
        other => eprintln!("Comando sconosciuto: {other} (/end, /restart, /traits, /quit)"),
    }
    false
}

async fn text_loop(engine: &mut SessionEngine) {
    println!("Dialogo: allenamento alla vendita. Scrivi il tuo turno e premi Invio.");
    println!("Comandi: /end  /restart  /traits  /quit\n");
    if !begin_session(engine) {
        return;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("Tu: ");
        let _ = std::io::stdout().flush();
        let line = tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => line,
                _ => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('/') {
            if handle_command(engine, line) {
                break;
            }
            continue;
        }

        print!("Cliente: ");
        let _ = std::io::stdout().flush();
        let mut printed = 0usize;
        let result = engine
            .submit_turn_live(line, |visible| {
                if visible.len() > printed {
                    print!("{}", &visible[printed..]);
                    let _ = std::io::stdout().flush();
                    printed = visible.len();
                }
            })
            .await;
        match result {
            Ok(outcome) => {
                // Nothing streamed (e.g. reply opened with the trait block).
                if printed == 0 {
                    print!("{}", outcome.reply.content);
                }
                println!("\n");
            }
            Err(e) => {
                println!();
                eprintln!("Errore del modello: {e}. Riprova.");
            }
        }
    }
    tracing::info!("trainer shutting down");
}

async fn voice_loop(engine: &mut SessionEngine, mut voice: VoiceController) {
    println!("Dialogo: modalità vocale. Invio per parlare, Invio di nuovo per terminare il turno.");
    println!("Comandi: /end  /restart  /traits  /quit\n");
    if !begin_session(engine) {
        return;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    _ => break,
                };
                let line = line.trim().to_string();
                if line.starts_with('/') {
                    voice.interrupt();
                    if handle_command(engine, &line) {
                        break;
                    }
                    continue;
                }
                match voice.phase() {
                    VoicePhase::Idle => match voice.try_start_listening() {
                        Ok(true) => println!("(ascolto... Invio per terminare)"),
                        Ok(false) => {}
                        Err(e) => eprintln!("{}", e.user_message()),
                    },
                    VoicePhase::Listening => voice.stop_listening(),
                    VoicePhase::Speaking => {
                        voice.interrupt();
                        println!("(risposta interrotta)");
                    }
                    VoicePhase::Processing => {}
                }
            }
            event = voice.next_event() => {
                let Some(event) = event else { break };
                match event {
                    VoiceEvent::InterimTranscript(text) => {
                        print!("\rTu: {text}");
                        let _ = std::io::stdout().flush();
                    }
                    VoiceEvent::TurnReady(text) => {
                        println!("\rTu: {text}");
                        match engine.submit_turn(&text).await {
                            Ok(outcome) => {
                                println!("Cliente: {}\n", outcome.reply.content);
                                if let Err(e) = voice.speak(&outcome.reply.content).await {
                                    eprintln!("{}", e.user_message());
                                    voice.reply_failed();
                                }
                            }
                            Err(e) => {
                                eprintln!("Errore del modello: {e}. Riprova.");
                                voice.reply_failed();
                            }
                        }
                    }
                    VoiceEvent::ReplyFinished => {
                        println!("(Invio per parlare)");
                    }
                    VoiceEvent::Failed(message) => {
                        eprintln!("{message}");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }
    voice.interrupt();
    tracing::info!("trainer shutting down");
}
