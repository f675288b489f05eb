use std::{fs::File, sync::Arc};

use chrono::Utc;
use dotenv::dotenv;
use teloxide::{
    dispatching::dialogue::{serializer::Json, ErasedStorage, SqliteStorage, Storage},
    prelude::*,
    types::{KeyboardButton, KeyboardMarkup, KeyboardRemove},
};
use tokio::sync::Mutex;
use tokio::task::block_in_place;

use word_quiz_bot::config::Config;
use word_quiz_bot::quiz::archetype::ArchetypeSet;
use word_quiz_bot::quiz::difficulty::Difficulty;
use word_quiz_bot::quiz::frequency::{FrequencyEntry, StopWords};
use word_quiz_bot::quiz::game::{Feedback, GameError, QuizGame, Turn};
use word_quiz_bot::quiz::generator::QuestionGenerator;
use word_quiz_bot::quiz::timer::{FEEDBACK_PAUSE, TICK};
use word_quiz_bot::quiz::Question;
use word_quiz_bot::store::{self, Document, JsonStore, SessionRecord, WordStore};

type QuizDialogue = Dialogue<State, ErasedStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type UserInfoStorage = std::sync::Arc<ErasedStorage<State>>;
/// Held while a chat's game is read, changed and written back, so a countdown
/// tick can never overwrite a newer answer.
type TurnLock = Arc<Mutex<()>>;

#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub enum State {
    #[default]
    Start,
    ReceiveFullName,
    ReceiveDocumentChoice {
        player: String,
    },
    ReceiveDifficulty {
        player: String,
        document_id: i64,
    },
    Playing {
        game: QuizGame,
    },
}

#[tokio::main]
async fn main() {
    let dotenv_loaded = dotenv().is_ok();
    pretty_env_logger::init();
    if !dotenv_loaded {
        log::warn!("No .env file found, reading settings from the environment only");
    }

    let config = Config::from_env().expect("Invalid configuration");
    log::info!("Starting word quiz bot...");

    let bot = Bot::from_env();

    log::info!("Opening dialogue database {}", config.dialogue_db);
    let storage: UserInfoStorage = SqliteStorage::open(&config.dialogue_db, Json)
        .await
        .expect("Failed to open the dialogue database")
        .erase();

    let store = Arc::new(JsonStore::open(&config.store_path).expect("Failed to open the quiz store"));

    let stopwords = match File::open(&config.stopwords_path) {
        Ok(file) => StopWords::new(file).expect("Failed to read the stop-word list"),
        Err(err) => {
            log::warn!(
                "No stop-word list at {} ({}), keeping every word",
                config.stopwords_path.display(),
                err
            );
            StopWords::default()
        }
    };
    log::info!("Loaded {} stop-words", stopwords.len());

    match store::ingest_directory(&*store, &config.documents_dir, &stopwords) {
        Ok(added) => log::info!("Indexed {} new documents", added),
        Err(err) => log::warn!(
            "Could not index documents from {}: {}",
            config.documents_dir.display(),
            err
        ),
    }

    let config = Arc::new(config);
    let turn_lock: TurnLock = Arc::new(Mutex::new(()));

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .enter_dialogue::<Message, ErasedStorage<State>, State>()
            .branch(dptree::case![State::Start].endpoint(start))
            .branch(dptree::case![State::ReceiveFullName].endpoint(receive_full_name))
            .branch(
                dptree::case![State::ReceiveDocumentChoice { player }]
                    .endpoint(receive_document_choice),
            )
            .branch(
                dptree::case![State::ReceiveDifficulty {
                    player,
                    document_id
                }]
                .endpoint(receive_difficulty),
            )
            .branch(dptree::case![State::Playing { game }].endpoint(playing)),
    )
    .dependencies(dptree::deps![storage, store, config, turn_lock])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;
}

const GREETING_TEXT: &str = "Hi! I turn texts into word quizzes. Let's get acquainted first: what is your name?";
const LEADERBOARD: &str = "Leaderboard";
const SKIP: &str = "Skip";
const WARN_AT_SECONDS: u32 = 5;

async fn start(bot: Bot, dialogue: QuizDialogue, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, GREETING_TEXT)
        .reply_markup(KeyboardRemove::new())
        .await?;

    dialogue.update(State::ReceiveFullName).await?;
    Ok(())
}

async fn receive_full_name(
    bot: Bot,
    dialogue: QuizDialogue,
    msg: Message,
    store: Arc<JsonStore>,
) -> HandlerResult {
    let Some(full_name) = msg.text().map(str::trim).filter(|n| !n.is_empty()) else {
        bot.send_message(msg.chat.id, "Please type your name").await?;
        return Ok(());
    };

    bot.send_message(msg.chat.id, format!("Nice to meet you, {}!", full_name))
        .await?;
    send_document_choice(&bot, msg.chat.id, &store).await?;

    dialogue
        .update(State::ReceiveDocumentChoice {
            player: full_name.to_string(),
        })
        .await?;
    Ok(())
}

async fn receive_document_choice(
    bot: Bot,
    dialogue: QuizDialogue,
    player: String,
    msg: Message,
    store: Arc<JsonStore>,
    config: Arc<Config>,
) -> HandlerResult {
    let documents = store.documents()?;
    let choice = msg.text().map(str::trim);

    if choice == Some(LEADERBOARD) {
        let records = store.leaderboard(None, config.leaderboard_size)?;
        bot.send_message(msg.chat.id, leaderboard_text(&records))
            .await?;
        return Ok(());
    }

    let Some(document) = documents.iter().find(|d| Some(d.title.as_str()) == choice) else {
        bot.send_message(msg.chat.id, "Please choose one of the documents")
            .reply_markup(document_keyboard(&documents))
            .await?;
        return Ok(());
    };

    bot.send_message(msg.chat.id, difficulty_text())
        .reply_markup(difficulty_keyboard())
        .await?;

    dialogue
        .update(State::ReceiveDifficulty {
            player,
            document_id: document.id,
        })
        .await?;
    Ok(())
}

async fn receive_difficulty(
    bot: Bot,
    dialogue: QuizDialogue,
    (player, document_id): (String, i64),
    msg: Message,
    store: Arc<JsonStore>,
    config: Arc<Config>,
    lock: TurnLock,
) -> HandlerResult {
    let Some(label) = msg.text() else {
        bot.send_message(msg.chat.id, "Please choose a difficulty")
            .await?;
        return Ok(());
    };

    // Unknown labels are not an error, the game falls back to a default setup
    let game = QuizGame::start(&player, document_id, label, config.scoring)?;
    bot.send_message(
        msg.chat.id,
        format!(
            "Great! {} questions, {} seconds each. Let's go!",
            game.session().max_questions(),
            game.session().timeout_seconds()
        ),
    )
    .reply_markup(KeyboardRemove::new())
    .await?;

    dialogue.update(State::Playing { game }).await?;
    ask_next_question(bot, dialogue, store, config, lock).await
}

async fn playing(
    bot: Bot,
    dialogue: QuizDialogue,
    msg: Message,
    store: Arc<JsonStore>,
    config: Arc<Config>,
    lock: TurnLock,
) -> HandlerResult {
    let Some(answer) = msg.text() else {
        bot.send_message(msg.chat.id, "Please answer with one of the options")
            .await?;
        return Ok(());
    };

    let guard = lock.lock().await;
    // The state injected by the dispatcher may be stale by now
    let Some(State::Playing { mut game }) = dialogue.get().await? else {
        return Ok(());
    };
    // Nothing ticks a question that was pending while the bot was down
    if let Some(turn) = block_in_place(|| game.expire_overdue(Utc::now(), &*store))? {
        save_turn(&dialogue, game, &turn).await?;
        drop(guard);
        return finish_turn(bot, dialogue, store, config, lock, turn).await;
    }
    let Some(question) = game.current_question() else {
        drop(guard);
        bot.send_message(msg.chat.id, "Hold on, the next question is on its way")
            .await?;
        return Ok(());
    };
    let is_option = question.has_option(answer);

    let turn = if answer.trim() == SKIP {
        block_in_place(|| game.skip(&*store))?
    } else if is_option {
        block_in_place(|| game.submit(answer, &*store))?
    } else {
        drop(guard);
        bot.send_message(msg.chat.id, "Please choose one of the options on the keyboard")
            .await?;
        return Ok(());
    };

    save_turn(&dialogue, game, &turn).await?;
    drop(guard);

    finish_turn(bot, dialogue, store, config, lock, turn).await
}

/// Generates the next question of the chat's game, shows it and starts its countdown.
async fn ask_next_question(
    bot: Bot,
    dialogue: QuizDialogue,
    store: Arc<JsonStore>,
    config: Arc<Config>,
    lock: TurnLock,
) -> HandlerResult {
    let chat_id = dialogue.chat_id();
    let guard = lock.lock().await;
    let Some(State::Playing { mut game }) = dialogue.get().await? else {
        return Ok(());
    };

    let words = store.words_by_document(game.session().document_id())?;
    match draw_question(&mut game, &words, config.archetypes) {
        Ok(question) => {
            let number = game.question_number();
            let text = format!(
                "Question {}/{}:\n{}\n\nYou have {} seconds.",
                number,
                game.session().max_questions(),
                question.text,
                game.session().timeout_seconds()
            );
            dialogue.update(State::Playing { game }).await?;
            drop(guard);

            bot.send_message(chat_id, text)
                .reply_markup(options_keyboard(&question))
                .await?;
            spawn_countdown(bot, dialogue, store, config, lock, number);
        }
        Err(GameError::Generation(err)) => {
            log::warn!(
                "Stopping the quiz in chat {} on document {}: {}",
                chat_id,
                game.session().document_id(),
                err
            );
            let player = game.session().player().to_string();
            game.abandon();
            dialogue
                .update(State::ReceiveDocumentChoice { player })
                .await?;
            drop(guard);

            bot.send_message(
                chat_id,
                "Sorry, this document does not have enough different words for a quiz. Please choose another one.",
            )
            .reply_markup(document_keyboard(&store.documents()?))
            .await?;
        }
        Err(err) => log::warn!("No question asked in chat {}: {}", chat_id, err),
    }
    Ok(())
}

fn draw_question(
    game: &mut QuizGame,
    words: &[FrequencyEntry],
    archetypes: ArchetypeSet,
) -> Result<Question, GameError> {
    let mut generator = QuestionGenerator::new(archetypes);
    game.next_question(&mut generator, words).cloned()
}

fn spawn_countdown(
    bot: Bot,
    dialogue: QuizDialogue,
    store: Arc<JsonStore>,
    config: Arc<Config>,
    lock: TurnLock,
    question_number: u32,
) {
    tokio::spawn(async move {
        let chat_id = dialogue.chat_id();
        if let Err(err) = run_countdown(bot, dialogue, store, config, lock, question_number).await
        {
            log::error!(
                "Countdown of question #{} in chat {} failed: {}",
                question_number,
                chat_id,
                err
            );
        }
    });
}

/// Ticks the countdown of question `question_number` once per second until it
/// is answered, skipped or runs out of time.
async fn run_countdown(
    bot: Bot,
    dialogue: QuizDialogue,
    store: Arc<JsonStore>,
    config: Arc<Config>,
    lock: TurnLock,
    question_number: u32,
) -> HandlerResult {
    let mut ticker = tokio::time::interval(TICK);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let guard = lock.lock().await;
        let mut game = match dialogue.get().await? {
            Some(State::Playing { game })
                if game.question_number() == question_number
                    && game.current_question().is_some() =>
            {
                game
            }
            _ => return Ok(()),
        };

        let turn = block_in_place(|| game.tick(&*store))?;
        let seconds_left = game.seconds_left();
        match &turn {
            Some(turn) => save_turn(&dialogue, game, turn).await?,
            None => dialogue.update(State::Playing { game }).await?,
        }
        drop(guard);

        if let Some(turn) = turn {
            return finish_turn(bot, dialogue, store, config, lock, turn).await;
        }
        if seconds_left == Some(WARN_AT_SECONDS) {
            bot.send_message(
                dialogue.chat_id(),
                format!("{} seconds left!", WARN_AT_SECONDS),
            )
            .await?;
        }
    }
}

/// Writes the game back, or leaves the game when the turn finished it.
async fn save_turn(dialogue: &QuizDialogue, game: QuizGame, turn: &Turn) -> HandlerResult {
    let state = match &turn.result {
        Some(record) => State::ReceiveDocumentChoice {
            player: record.username.clone(),
        },
        None => State::Playing { game },
    };
    dialogue.update(state).await?;
    Ok(())
}

/// Shows the feedback of a turn, then the results or, after a short pause,
/// the next question.
async fn finish_turn(
    bot: Bot,
    dialogue: QuizDialogue,
    store: Arc<JsonStore>,
    config: Arc<Config>,
    lock: TurnLock,
    turn: Turn,
) -> HandlerResult {
    let chat_id = dialogue.chat_id();
    bot.send_message(chat_id, feedback_text(&turn.feedback))
        .reply_markup(KeyboardRemove::new())
        .await?;

    match turn.result {
        Some(record) => {
            let leaderboard = store.leaderboard(Some(record.document_id), config.leaderboard_size)?;
            bot.send_message(chat_id, results_text(&record, &leaderboard))
                .reply_markup(document_keyboard(&store.documents()?))
                .await?;
        }
        None => {
            tokio::time::sleep(FEEDBACK_PAUSE).await;
            ask_next_question(bot, dialogue, store, config, lock).await?;
        }
    }
    Ok(())
}

async fn send_document_choice(bot: &Bot, chat_id: ChatId, store: &JsonStore) -> HandlerResult {
    let documents = store.documents()?;
    if documents.is_empty() {
        bot.send_message(chat_id, "There are no documents to play with yet, come back later!")
            .reply_markup(document_keyboard(&documents))
            .await?;
        return Ok(());
    }

    bot.send_message(chat_id, "Which document would you like to be quizzed on?")
        .reply_markup(document_keyboard(&documents))
        .await?;
    Ok(())
}

fn document_keyboard(documents: &[Document]) -> KeyboardMarkup {
    let mut rows = documents
        .iter()
        .map(|d| vec![KeyboardButton::new(d.title.clone())])
        .collect::<Vec<_>>();
    rows.push(vec![KeyboardButton::new(LEADERBOARD)]);
    KeyboardMarkup::new(rows).resize_keyboard(true)
}

fn difficulty_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![Difficulty::ALL
        .iter()
        .map(|d| KeyboardButton::new(d.label()))
        .collect::<Vec<_>>()])
    .resize_keyboard(true)
}

fn options_keyboard(question: &Question) -> KeyboardMarkup {
    let mut rows = question
        .options
        .iter()
        .map(|o| vec![KeyboardButton::new(o.clone())])
        .collect::<Vec<_>>();
    rows.push(vec![KeyboardButton::new(SKIP)]);
    KeyboardMarkup::new(rows).resize_keyboard(true)
}

fn difficulty_text() -> String {
    let lines = Difficulty::ALL
        .iter()
        .map(|d| {
            let config = d.config();
            format!(
                "{}: {} questions, {} seconds each",
                d.label(),
                config.max_questions,
                config.timeout_seconds
            )
        })
        .collect::<Vec<_>>();
    format!("Choose a difficulty:\n{}", lines.join("\n"))
}

fn feedback_text(feedback: &Feedback) -> String {
    match feedback {
        Feedback::Correct { points } => format!("Correct! +{} points", points),
        Feedback::Incorrect { correct_answer } => {
            format!("Wrong! The correct answer was \"{}\"", correct_answer)
        }
        Feedback::Skipped { correct_answer } => {
            format!("Skipped. The correct answer was \"{}\"", correct_answer)
        }
        Feedback::TimedOut { correct_answer } => {
            format!("Time is up! The correct answer was \"{}\"", correct_answer)
        }
    }
}

fn results_text(record: &SessionRecord, leaderboard: &[SessionRecord]) -> String {
    format!(
        "The quiz is over! You answered {} of {} questions correctly and scored {} points.\n\n{}\n\nWhat would you like to do next?",
        record.correct_answers,
        record.questions_answered,
        record.score,
        leaderboard_text(leaderboard)
    )
}

fn leaderboard_text(records: &[SessionRecord]) -> String {
    if records.is_empty() {
        return "Nobody has finished a quiz yet.".to_string();
    }
    let rows = records
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {} ({}): {}", i + 1, r.username, r.difficulty, r.score))
        .collect::<Vec<_>>();
    format!("Top scores:\n{}", rows.join("\n"))
}
